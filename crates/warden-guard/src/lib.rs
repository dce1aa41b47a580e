//! # Warden Guards
//!
//! Leaf components that talk to the host operating system.
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`ProcessEnvironmentGuard`] | Own-process metrics, process list deny-list scan |
//! | [`DebuggerDetector`] | Rate-limited tracer / env var / module checks |
//! | [`MemoryRegionGuard`] | Fault-free raw reads, modification scans, page protection |
//!
//! ## Security Notes
//!
//! These checks are illustrative heuristics, not a hardened anti-tamper
//! layer. The deny-lists are trivially evaded by renaming a binary and may
//! fire on innocent processes whose names contain a listed word. The
//! double-read region scan only catches writes that land between two
//! reads. Keep the thresholds for reproducibility; do not rely on them as
//! a security boundary.
//!
//! Boolean-returning checks never panic and never return errors: an
//! unreadable address or a refused protection change is simply `false`.

mod debugger;
mod error;
mod memory;
mod process;

pub use debugger::{DebuggerConfig, DebuggerDetector, DebuggerIndicator};
pub use error::{GuardError, Result};
pub use memory::{MemoryRegionGuard, Protection, RegionFault, DEFAULT_REGION_SIZE};
pub use process::{
    match_deny_list, ProcessEnvironmentGuard, ProcessMetrics, ProcessProbe, SuspiciousProcess,
    DEFAULT_PROCESS_DENY_LIST,
};
