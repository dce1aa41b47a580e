//! # Integration Tests
//!
//! OS-facing behavior of the guards against the live test process.

use warden_guard::{
    DebuggerConfig, DebuggerDetector, MemoryRegionGuard, ProcessEnvironmentGuard, ProcessProbe,
    RegionFault,
};

// ============================================================================
// Memory Region Tests
// ============================================================================

#[cfg(unix)]
#[test]
fn test_corrupting_first_byte_between_scans_is_detected() {
    let mut board = vec![0u8; 200].into_boxed_slice();
    let address = board.as_ptr() as usize;

    let mut guard = MemoryRegionGuard::new();
    guard.cache_address(address);

    // Untouched memory scans clean, repeatedly.
    assert!(guard.scan_region(address, 64));
    assert!(guard.scan_region(address, 64));

    // SAFETY: index 0 is in bounds.
    unsafe { std::ptr::write_volatile(board.as_mut_ptr(), 0xAB) };
    assert!(!guard.scan_region(address, 64));
}

#[cfg(unix)]
#[test]
fn test_watched_value_survives_reads_but_not_writes() {
    let mut score = Box::new(100_u64);
    let mut guard = MemoryRegionGuard::new().with_region_size(8);
    let address = guard.cache_value(&*score);

    for _ in 0..3 {
        assert!(guard.check_all().is_ok());
    }

    // SAFETY: `score` is a live, aligned u64.
    unsafe { std::ptr::write_volatile(&mut *score as *mut u64, 999_999) };
    assert_eq!(guard.check_all(), Err(RegionFault::Modified { address }));
}

#[test]
fn test_unreadable_address_never_panics() {
    let mut guard = MemoryRegionGuard::new();
    guard.cache_address(0x8);
    assert!(!guard.is_readable(0x8, 64));
    assert!(!guard.scan_region(0x8, 64));
    assert!(matches!(guard.check_all(), Err(RegionFault::Unreadable { address: 0x8 })));
}

// ============================================================================
// Process Environment Tests
// ============================================================================

#[test]
fn test_sampler_trait_object_samples_live_process() {
    let mut probe: Box<dyn ProcessProbe> = Box::new(ProcessEnvironmentGuard::new().unwrap());
    let first = probe.sample_self().unwrap();
    let second = probe.sample_self().unwrap();
    assert!(first.resident_memory_bytes > 0);
    // Memory does not swing by 10 MB between two back-to-back samples of
    // an idle test process.
    assert!(first.resident_memory_bytes.abs_diff(second.resident_memory_bytes) < 10_000_000);
}

#[test]
fn test_own_process_is_excluded_from_scan() {
    // The test binary's own name is always on the list; the scan must
    // still come back clean because the current process is skipped.
    let me = std::env::current_exe().unwrap();
    let name = me.file_name().unwrap().to_string_lossy().to_lowercase();
    let mut guard = ProcessEnvironmentGuard::new().unwrap().with_deny_list([name]);

    if let Some(found) = guard.find_suspicious_process() {
        assert_ne!(found.pid, guard.pid());
    }
}

#[test]
fn test_environment_guard_with_quiet_debugger_config() {
    let detector = DebuggerDetector::new(
        DebuggerConfig::new()
            .with_tracer_check(false)
            .with_env_vars(Vec::<String>::new())
            .with_module_patterns(Vec::<String>::new()),
    );
    let mut guard = ProcessEnvironmentGuard::new().unwrap().with_debugger(detector);
    assert!(!guard.detect_debugger_present());
    assert_eq!(guard.debugger_mut().check_count(), 1);
}
