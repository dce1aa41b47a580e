//! # Warden Core
//!
//! Configuration and wiring for the Warden runtime integrity monitor.
//!
//! ## Components
//!
//! | Layer | Crate | Detects |
//! |-------|-------|---------|
//! | State | `warden-monitor` | Score jumps, board rewrites, frozen field drift, cadence |
//! | Memory | `warden-guard` | Modified or unmapped watched regions |
//! | Environment | `warden-guard` | Deny-listed processes, debuggers |
//! | Identity | `warden-fingerprint` | Snapshot fingerprints, per-field digests |
//! | Input | `warden-monitor` | Scripted key-press cadence |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                       WARDEN                         │
//! ├──────────────────────────────────────────────────────┤
//! │                                                      │
//! │   WardenConfig (TOML) ──► Warden::from_config        │
//! │                                 │                    │
//! │                                 ▼                    │
//! │                      ┌────────────────────┐          │
//! │                      │  IntegrityMonitor  │          │
//! │                      └─────────┬──────────┘          │
//! │            ┌───────────────────┼────────────────┐    │
//! │            ▼                   ▼                ▼    │
//! │     ┌────────────┐     ┌─────────────┐   ┌─────────┐ │
//! │     │ Snapshot   │     │ MemoryRegion│   │ Process │ │
//! │     │ Store      │     │ Guard       │   │ Env     │ │
//! │     └─────┬──────┘     └─────────────┘   └─────────┘ │
//! │           ▼                                          │
//! │   FanoutSink ──► SecurityLog + journal               │
//! │                                                      │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Notes
//!
//! - Configuration is validated before anything is built
//! - Snapshot and validation failures follow the configured
//!   [`PolicyTable`](warden_types::PolicyTable); integrity violations are
//!   always fail-closed

mod config;
mod error;
mod warden;

pub use config::{GuardSection, InputSection, LogSection, MonitorSection, StoreSection, WardenConfig};
pub use error::{Result, WardenError};
pub use warden::Warden;
