//! # Warden Monitor
//!
//! Snapshot validation and background integrity monitoring for a host
//! that owns a mutable game state.
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`SnapshotStore`] | Accepted baseline + the validation pipeline |
//! | [`IntegrityMonitor`] | Periodic checks, lifecycle, violation protocol |
//! | [`SuspiciousActivityLedger`] | Windowed score-change cadence heuristics |
//! | [`InputCadence`] | Key-press timing validation |
//! | [`StateView`] | Host-written live state the loop validates |
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use warden_guard::{MemoryRegionGuard, ProcessMetrics, ProcessProbe};
//! use warden_monitor::{CheckOutcome, IntegrityMonitor, MonitorConfig, SnapshotStore, StoreConfig};
//! use warden_types::{MemorySink, TrackedState};
//!
//! struct Quiet;
//! impl ProcessProbe for Quiet {
//!     fn sample_self(&mut self) -> warden_guard::Result<ProcessMetrics> {
//!         Ok(ProcessMetrics { cpu_load: 0.0, resident_memory_bytes: 1 << 20, thread_count: 1 })
//!     }
//! }
//!
//! let sink = Arc::new(MemorySink::new());
//! let store = SnapshotStore::new(StoreConfig::new(), sink.clone(), Box::new(Quiet));
//! let monitor = IntegrityMonitor::new(MonitorConfig::new(), store, MemoryRegionGuard::new(), sink.clone());
//!
//! let state = TrackedState::new().with_field("score", 0).with_field("shapes", json!(["T"]));
//! monitor.start(state.clone())?;
//!
//! monitor.update_game_state(state.with_field("score", 40));
//! assert_eq!(monitor.check_now(), CheckOutcome::Clean);
//!
//! monitor.stop();
//! assert!(sink.is_empty());
//! # Ok::<(), warden_monitor::MonitorError>(())
//! ```
//!
//! ## Security Notes
//!
//! - The heuristics (score jump, board diff, cadence, process metrics) are
//!   illustrative thresholds, not a hardened anti-cheat model
//! - Every failure reaches the event sink before the verdict or the
//!   lifecycle change it causes
//! - Restarting after a violation is always an explicit host decision

mod cadence;
mod error;
mod ledger;
mod monitor;
mod store;
mod view;

pub use cadence::InputCadence;
pub use error::{MonitorError, Result};
pub use ledger::{CadenceAnomaly, LedgerEntry, SuspiciousActivityLedger, SCORE_CHANGES};
pub use monitor::{CheckOutcome, IntegrityMonitor, LifecycleState, MonitorConfig, ViolationCallback};
pub use store::{Snapshot, SnapshotStore, StoreConfig};
pub use view::StateView;
