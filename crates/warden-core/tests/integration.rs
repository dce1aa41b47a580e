//! # Integration Tests
//!
//! Configuration loading and the assembled facade.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use warden_core::{Warden, WardenConfig, WardenError};
use warden_guard::{ProcessMetrics, ProcessProbe};
use warden_monitor::{CheckOutcome, LifecycleState};
use warden_types::{ManualClock, TrackedState, ViolationKind};

struct Steady;

impl ProcessProbe for Steady {
    fn sample_self(&mut self) -> warden_guard::Result<ProcessMetrics> {
        Ok(ProcessMetrics {
            cpu_load: 1.0,
            resident_memory_bytes: 16_000_000,
            thread_count: 2,
        })
    }
}

fn config_in(dir: &tempfile::TempDir) -> WardenConfig {
    let mut config = WardenConfig::default();
    config.log.security_log = dir.path().join("security_log.txt");
    config.monitor.interval_ms = 20;
    config
}

fn state(score: i64) -> TrackedState {
    TrackedState::new()
        .with_field("board", json!(vec![vec![0u8; 10]; 20]))
        .with_field("score", score)
        .with_field("shapes", json!([[[1, 1, 1, 1]], [[1, 1], [1, 1]]]))
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warden.toml");
    std::fs::write(&path, "[store]\nboard_change_threshold = 8\n\n[log]\nsecurity_log = \"audit.log\"\n").unwrap();

    let config = WardenConfig::load(&path).unwrap();
    assert_eq!(config.store.board_change_threshold, 8);
    assert_eq!(config.log.security_log, std::path::PathBuf::from("audit.log"));
}

#[test]
fn test_missing_file_names_the_path() {
    let err = WardenConfig::load("/nonexistent/warden.toml").unwrap_err();
    assert!(matches!(err, WardenError::ConfigRead { .. }));
    assert!(err.to_string().contains("/nonexistent/warden.toml"));
}

#[test]
fn test_invalid_config_is_refused_by_the_facade() {
    let mut config = WardenConfig::default();
    config.guard.region_size = 0;
    assert!(matches!(
        Warden::with_probe(config, Box::new(Steady)),
        Err(WardenError::Config(_))
    ));
}

#[test]
fn test_clean_session_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let warden = Warden::with_probe(config_in(&dir), Box::new(Steady)).unwrap();

    assert_eq!(warden.monitor().start(state(0)).unwrap(), LifecycleState::Running);
    assert!(warden.monitor().validate_state(&state(40)));
    assert!(warden.monitor().update_game_state(state(40)));
    assert_eq!(warden.monitor().check_now(), CheckOutcome::Clean);
    warden.monitor().stop();

    assert!(warden.journal().is_empty());
    assert!(!warden.config().log.security_log.exists());
}

#[test]
fn test_events_reach_journal_and_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let log_path = config.log.security_log.clone();
    let warden = Warden::with_probe(config, Box::new(Steady)).unwrap();

    warden.monitor().start(state(100)).unwrap();
    assert!(!warden.monitor().validate_state(&state(1200)));
    warden.monitor().stop();

    assert_eq!(warden.integrity_violations(), 1);
    let log = std::fs::read_to_string(log_path).unwrap();
    assert!(log.contains("Suspicious score increase: 1100"));
}

#[test]
fn test_configured_threshold_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.store.score_jump_threshold = 5000;
    let warden = Warden::with_probe(config, Box::new(Steady)).unwrap();

    warden.monitor().start(state(100)).unwrap();
    assert!(warden.monitor().validate_state(&state(1200)));
    warden.monitor().stop();
    assert_eq!(warden.journal().count_kind(ViolationKind::IntegrityViolation), 0);
}

#[test]
fn test_watched_value_tampering_stops_the_monitor() {
    let dir = tempfile::tempdir().unwrap();
    let warden = Warden::with_probe(config_in(&dir), Box::new(Steady)).unwrap();
    let mut catalog = Box::new([7u8; 32]);
    warden.monitor().watch_value(&*catalog);
    warden.monitor().start(state(0)).unwrap();

    // SAFETY: `catalog` is live and owned by this test.
    unsafe { std::ptr::write_volatile(catalog.as_mut_ptr().add(3), 0) };

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while warden.monitor().is_running() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(warden.monitor().state(), LifecycleState::Stopped);
    assert!(warden.integrity_violations() >= 1);
    drop(catalog);
}

fn press_burst(warden: &Warden, clock: &ManualClock, presses: usize) -> usize {
    let mut rejected = 0;
    for _ in 0..presses {
        clock.advance(Duration::from_millis(10));
        if !warden.validate_input() {
            rejected += 1;
        }
    }
    rejected
}

#[test]
fn test_human_input_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new();
    let warden = Warden::with_probe(config_in(&dir), Box::new(Steady))
        .unwrap()
        .with_input_clock(Arc::new(clock.clone()));

    for _ in 0..30 {
        clock.advance(Duration::from_millis(150));
        assert!(warden.validate_input());
    }
    assert!(warden.journal().is_empty());
}

#[test]
fn test_scripted_input_is_rejected_and_logged() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let log_path = config.log.security_log.clone();
    let clock = ManualClock::new();
    let warden = Warden::with_probe(config, Box::new(Steady))
        .unwrap()
        .with_input_clock(Arc::new(clock.clone()));

    // The first press has no predecessor; the next four raise suspicion to 4.
    assert_eq!(press_burst(&warden, &clock, 5), 0);
    assert!(!warden.validate_input());

    assert_eq!(warden.integrity_violations(), 1);
    let last = warden.journal().last().unwrap();
    assert_eq!(last.message(), "Suspicious input timing detected: 5 rapid inputs");
    let log = std::fs::read_to_string(log_path).unwrap();
    assert!(log.contains("Suspicious input timing detected"));

    warden.reset_input();
    clock.advance(Duration::from_millis(150));
    assert!(warden.validate_input());
}

#[test]
fn test_input_threshold_comes_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.input.max_suspicious = 2;
    let clock = ManualClock::new();
    let warden = Warden::with_probe(config, Box::new(Steady))
        .unwrap()
        .with_input_clock(Arc::new(clock.clone()));

    assert_eq!(press_burst(&warden, &clock, 3), 1);
}

#[test]
fn test_bounded_journal_still_counts_every_violation() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.log.journal_capacity = 2;
    let clock = ManualClock::new();
    let warden = Warden::with_probe(config, Box::new(Steady))
        .unwrap()
        .with_input_clock(Arc::new(clock.clone()));

    // Presses six through nine are all rejected.
    assert_eq!(press_burst(&warden, &clock, 9), 4);

    let journal = warden.journal();
    assert_eq!(journal.capacity(), Some(2));
    assert_eq!(journal.len(), 2);
    assert_eq!(journal.dropped(), 2);
    assert_eq!(warden.integrity_violations(), 4);
    assert_eq!(
        journal.last().unwrap().message(),
        "Suspicious input timing detected: 8 rapid inputs"
    );
}
