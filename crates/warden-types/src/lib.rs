//! # Warden Types
//!
//! Shared vocabulary for the Warden runtime integrity monitor. Every other
//! Warden crate depends on this one; it has no knowledge of hashing, the
//! host operating system, or scheduling.
//!
//! ## Contents
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`TrackedState`] | Host-owned field map handed to the monitor on every call |
//! | [`ViolationEvent`] | Append-only forensic record of a failure or detection |
//! | [`EventSink`] | Injected writer for violation events |
//! | [`Clock`] | Monotonic time source for rate limits and windows |
//! | [`PolicyTable`] | Explicit fail-open / fail-closed decision per error kind |
//!
//! ## Security Notes
//!
//! - Events are recorded BEFORE any state change they cause (stop, reject)
//! - Sinks never propagate write failures to the caller
//! - Components receive their sink at construction; there is no global log

mod clock;
mod error;
mod event;
mod policy;
mod sink;
mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, TypesError};
pub use event::{Severity, ViolationEvent, ViolationKind};
pub use policy::{FailurePolicy, PolicyTable};
pub use sink::{EventSink, FanoutSink, MemorySink, SecurityLog};
pub use state::TrackedState;
