//! # Memory Region Guard
//!
//! Watches raw addresses registered by the host. Reads never dereference a
//! pointer directly: on Linux they go through `process_vm_readv` against
//! our own pid, and where that syscall is refused (seccomp, old kernels)
//! through a pipe, letting the kernel report `EFAULT` instead of raising
//! `SIGSEGV`. An unreadable address is therefore just `false`.
//!
//! ## Scan Semantics
//!
//! | Address | `scan_region` compares |
//! |---------|------------------------|
//! | Registered, baseline known | current bytes vs last-observed bytes, then re-baselines |
//! | Unregistered or no baseline | two back-to-back reads |
//!
//! The double read only notices a write that lands between the two reads.

use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Bytes watched per address registered with
/// [`MemoryRegionGuard::cache_address`].
pub const DEFAULT_REGION_SIZE: usize = 64;

/// Requested page protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// Pages may be read but not written.
    ReadOnly,
    /// Pages may be read and written.
    ReadWrite,
}

/// First failed region found by [`MemoryRegionGuard::check_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionFault {
    /// The region could not be read.
    Unreadable {
        /// Registered address.
        address: usize,
    },
    /// The region's bytes changed since they were last observed.
    Modified {
        /// Registered address.
        address: usize,
    },
}

impl RegionFault {
    /// Address the fault refers to.
    #[must_use]
    pub const fn address(&self) -> usize {
        match self {
            Self::Unreadable { address } | Self::Modified { address } => *address,
        }
    }
}

impl fmt::Display for RegionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable { address } => write!(f, "memory region {address:#x} is not readable"),
            Self::Modified { address } => write!(f, "memory region {address:#x} was modified"),
        }
    }
}

#[derive(Debug, Clone)]
struct Region {
    size: usize,
    baseline: Option<Vec<u8>>,
}

/// Registry of watched addresses with their last-observed contents.
///
/// # Example
///
/// ```rust
/// use warden_guard::MemoryRegionGuard;
///
/// let score = Box::new(1200_u64);
/// let mut guard = MemoryRegionGuard::new();
/// let address = guard.cache_value(&*score);
///
/// assert!(guard.is_readable(address, std::mem::size_of::<u64>()));
/// assert!(guard.check_all().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct MemoryRegionGuard {
    region_size: usize,
    regions: BTreeMap<usize, Region>,
}

impl MemoryRegionGuard {
    /// Creates an empty guard watching [`DEFAULT_REGION_SIZE`] bytes per
    /// address.
    #[must_use]
    pub fn new() -> Self {
        Self {
            region_size: DEFAULT_REGION_SIZE,
            regions: BTreeMap::new(),
        }
    }

    /// Sets the number of bytes watched for addresses registered afterwards.
    #[must_use]
    pub fn with_region_size(mut self, size: usize) -> Self {
        self.region_size = size;
        self
    }

    /// Bytes watched per [`cache_address`](Self::cache_address).
    #[must_use]
    pub fn region_size(&self) -> usize {
        self.region_size
    }

    /// Registers `address` without validating it.
    ///
    /// The current bytes become the baseline if they can be read. Registering
    /// an address twice replaces its baseline.
    pub fn cache_address(&mut self, address: usize) {
        self.register(address, self.region_size);
    }

    /// Registers the memory occupied by `value` and returns its address.
    ///
    /// The caller must keep `value` alive and in place while it is watched;
    /// a freed value is reported as modified or unreadable.
    pub fn cache_value<T>(&mut self, value: &T) -> usize {
        let address = value as *const T as usize;
        self.register(address, std::mem::size_of::<T>().max(1));
        address
    }

    fn register(&mut self, address: usize, size: usize) {
        let baseline = read_bytes(address, size);
        debug!(
            address = format_args!("{address:#x}"),
            size,
            readable = baseline.is_some(),
            "address registered"
        );
        self.regions.insert(address, Region { size, baseline });
    }

    /// Registered addresses in ascending order.
    #[must_use]
    pub fn addresses(&self) -> Vec<usize> {
        self.regions.keys().copied().collect()
    }

    /// Number of registered addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Reads `size` bytes at `address`, or `None` on any fault.
    #[must_use]
    pub fn read_region(&self, address: usize, size: usize) -> Option<Vec<u8>> {
        read_bytes(address, size)
    }

    /// Returns true if `size` bytes at `address` can be read.
    #[must_use]
    pub fn is_readable(&self, address: usize, size: usize) -> bool {
        read_bytes(address, size).is_some()
    }

    /// Returns true if the region is unmodified (see the module docs).
    ///
    /// An unreadable region counts as modified.
    pub fn scan_region(&mut self, address: usize, size: usize) -> bool {
        let Some(current) = read_bytes(address, size) else {
            return false;
        };

        let unchanged = match self.regions.get(&address) {
            Some(Region {
                baseline: Some(previous),
                ..
            }) if previous.len() == size => *previous == current,
            _ => read_bytes(address, size).is_some_and(|again| again == current),
        };

        if let Some(region) = self.regions.get_mut(&address) {
            if region.size == size {
                region.baseline = Some(current);
            }
        }

        if !unchanged {
            warn!(address = format_args!("{address:#x}"), size, "memory region modified");
        }
        unchanged
    }

    /// Checks every registered region for readability, then modification.
    ///
    /// # Errors
    ///
    /// Returns the first failing region in address order.
    pub fn check_all(&mut self) -> Result<(), RegionFault> {
        let targets: Vec<(usize, usize)> = self
            .regions
            .iter()
            .map(|(address, region)| (*address, region.size))
            .collect();

        for (address, size) in targets {
            if !self.is_readable(address, size) {
                return Err(RegionFault::Unreadable { address });
            }
            if !self.scan_region(address, size) {
                return Err(RegionFault::Modified { address });
            }
        }
        Ok(())
    }

    /// Requests a page-protection change covering `[address, address + size)`.
    ///
    /// The range is widened to page boundaries. Returns false on an empty
    /// range or when the OS refuses the change (always, off unix).
    ///
    /// # Safety Notes
    ///
    /// Making a page read-only that the process later writes to will crash
    /// the process. Only protect memory you own.
    pub fn set_protection(&self, address: usize, size: usize, mode: Protection) -> bool {
        if size == 0 {
            return false;
        }
        let changed = protect(address, size, mode);
        if changed {
            debug!(address = format_args!("{address:#x}"), size, ?mode, "protection changed");
        } else {
            warn!(address = format_args!("{address:#x}"), size, ?mode, "protection change refused");
        }
        changed
    }
}

impl Default for MemoryRegionGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn read_bytes(address: usize, size: usize) -> Option<Vec<u8>> {
    if size == 0 || address == 0 {
        return None;
    }
    let mut buf = vec![0u8; size];
    let local = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: size,
    };
    let remote = libc::iovec {
        iov_base: address as *mut libc::c_void,
        iov_len: size,
    };

    // SAFETY: the kernel copies from our own address space into `buf`,
    // which is valid for `size` bytes; bad remote addresses yield EFAULT.
    let copied = unsafe { libc::process_vm_readv(libc::getpid(), &local, 1, &remote, 1, 0) };
    if usize::try_from(copied).is_ok_and(|n| n == size) {
        return Some(buf);
    }
    if copied < 0 {
        let errno = std::io::Error::last_os_error().raw_os_error();
        if matches!(errno, Some(libc::EPERM | libc::ENOSYS)) {
            return pipe_read(address, size);
        }
    }
    None
}

#[cfg(all(unix, not(target_os = "linux")))]
fn read_bytes(address: usize, size: usize) -> Option<Vec<u8>> {
    if size == 0 || address == 0 {
        return None;
    }
    pipe_read(address, size)
}

#[cfg(not(unix))]
fn read_bytes(_address: usize, _size: usize) -> Option<Vec<u8>> {
    None
}

#[cfg(unix)]
const PIPE_CHUNK: usize = 4096;

/// Copies memory through a pipe so the kernel validates the source range.
#[cfg(unix)]
fn pipe_read(address: usize, size: usize) -> Option<Vec<u8>> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` has room for the two descriptors.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return None;
    }
    let [read_fd, write_fd] = fds;

    let mut out = Vec::with_capacity(size);
    let mut chunk = [0u8; PIPE_CHUNK];
    let mut offset = 0;
    let mut ok = true;

    while offset < size {
        let len = (size - offset).min(PIPE_CHUNK);
        let Some(source) = address.checked_add(offset) else {
            ok = false;
            break;
        };
        // SAFETY: write(2) reads `len` bytes from `source`; an invalid
        // range fails with EFAULT instead of faulting this process.
        let written = unsafe { libc::write(write_fd, source as *const libc::c_void, len) };
        if usize::try_from(written).ok() != Some(len) {
            ok = false;
            break;
        }
        // SAFETY: `chunk` is valid for PIPE_CHUNK >= len bytes.
        let read = unsafe { libc::read(read_fd, chunk.as_mut_ptr().cast(), len) };
        if usize::try_from(read).ok() != Some(len) {
            ok = false;
            break;
        }
        out.extend_from_slice(&chunk[..len]);
        offset += len;
    }

    // SAFETY: both descriptors were opened above and are closed once.
    unsafe {
        libc::close(read_fd);
        libc::close(write_fd);
    }
    ok.then_some(out)
}

#[cfg(unix)]
fn protect(address: usize, size: usize, mode: Protection) -> bool {
    let page = page_size();
    let start = address & !(page - 1);
    let Some(end) = address
        .checked_add(size)
        .and_then(|end| end.checked_add(page - 1))
        .map(|end| end & !(page - 1))
    else {
        return false;
    };

    let prot = match mode {
        Protection::ReadOnly => libc::PROT_READ,
        Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
    };
    // SAFETY: mprotect validates the range itself and reports failures
    // through its return value.
    unsafe { libc::mprotect(start as *mut libc::c_void, end - start, prot) == 0 }
}

#[cfg(not(unix))]
fn protect(_address: usize, _size: usize, _mode: Protection) -> bool {
    false
}

#[cfg(unix)]
fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).ok().filter(|s| s.is_power_of_two()).unwrap_or(4096)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const UNMAPPED: usize = 0x10;

    fn poke(buf: &mut [u8], index: usize, value: u8) {
        // SAFETY: index is in bounds; volatile keeps the write observable.
        unsafe { std::ptr::write_volatile(buf.as_mut_ptr().add(index), value) };
    }

    #[test]
    fn test_reads_own_memory() {
        let data: Box<[u8]> = (0u8..64).collect();
        let guard = MemoryRegionGuard::new();
        let bytes = guard.read_region(data.as_ptr() as usize, data.len()).unwrap();
        assert_eq!(&bytes[..], &data[..]);
    }

    #[test]
    fn test_unmapped_address_is_unreadable() {
        let guard = MemoryRegionGuard::new();
        assert!(!guard.is_readable(UNMAPPED, 8));
        assert!(!guard.is_readable(0, 8));
    }

    #[test]
    fn test_pipe_read_matches_and_faults() {
        let data: Box<[u8]> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let copy = pipe_read(data.as_ptr() as usize, data.len()).unwrap();
        assert_eq!(&copy[..], &data[..]);
        assert!(pipe_read(UNMAPPED, 16).is_none());
    }

    #[test]
    fn test_scan_detects_corruption_of_registered_address() {
        let mut buf = vec![7u8; DEFAULT_REGION_SIZE].into_boxed_slice();
        let address = buf.as_ptr() as usize;
        let mut guard = MemoryRegionGuard::new();
        guard.cache_address(address);

        assert!(guard.scan_region(address, DEFAULT_REGION_SIZE));
        poke(&mut buf, 0, 0xFF);
        assert!(!guard.scan_region(address, DEFAULT_REGION_SIZE));
        // The corrupted bytes are now the baseline.
        assert!(guard.scan_region(address, DEFAULT_REGION_SIZE));
    }

    #[test]
    fn test_unregistered_scan_uses_double_read() {
        let buf = vec![1u8; 32].into_boxed_slice();
        let mut guard = MemoryRegionGuard::new();
        assert!(guard.scan_region(buf.as_ptr() as usize, 32));
        assert!(!guard.scan_region(UNMAPPED, 32));
        assert!(guard.is_empty());
    }

    #[test]
    fn test_check_all_reports_first_fault() {
        let mut value = Box::new([0u8; 16]);
        let mut guard = MemoryRegionGuard::new();
        let address = guard.cache_value(&*value);
        assert_eq!(guard.len(), 1);
        assert!(guard.check_all().is_ok());

        poke(&mut value[..], 3, 9);
        assert_eq!(guard.check_all(), Err(RegionFault::Modified { address }));

        guard.cache_address(UNMAPPED);
        assert_eq!(
            guard.check_all(),
            Err(RegionFault::Unreadable { address: UNMAPPED })
        );
        assert_eq!(guard.addresses()[0], UNMAPPED);
    }

    #[test]
    fn test_set_protection_on_mapped_page() {
        let page = page_size();
        // SAFETY: anonymous private mapping, unmapped at the end of the test.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                page,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(ptr, libc::MAP_FAILED);
        let address = ptr as usize;

        let guard = MemoryRegionGuard::new();
        assert!(guard.set_protection(address + 10, 20, Protection::ReadOnly));
        assert!(guard.is_readable(address, page));
        assert!(guard.set_protection(address, page, Protection::ReadWrite));
        assert!(!guard.set_protection(address, 0, Protection::ReadOnly));

        // SAFETY: same mapping as above.
        unsafe { libc::munmap(ptr, page) };
    }

    #[test]
    fn test_fault_display() {
        assert_eq!(
            RegionFault::Modified { address: 0x1000 }.to_string(),
            "memory region 0x1000 was modified"
        );
        assert_eq!(RegionFault::Unreadable { address: 0x20 }.address(), 0x20);
    }
}
