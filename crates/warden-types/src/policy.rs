//! Failure policies.
//!
//! Snapshot creation and validation historically disagreed about what a
//! fault means: a failed snapshot simply did not advance tracking, while a
//! failed validation rejected the state. [`PolicyTable`] makes both choices
//! explicit and configurable.

use crate::event::ViolationKind;
use serde::{Deserialize, Serialize};

/// Outcome applied when an operation faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The fault is logged and the operation is treated as non-fatal.
    FailOpen,
    /// The fault is logged and treated as a failed check.
    FailClosed,
}

impl FailurePolicy {
    /// Returns true for [`FailurePolicy::FailClosed`].
    #[must_use]
    pub const fn is_fail_closed(self) -> bool {
        matches!(self, Self::FailClosed)
    }
}

/// Failure policy per error kind.
///
/// Only snapshot failures and validation errors are configurable.
/// Integrity violations and address faults are always fail-closed.
///
/// # Example
///
/// ```rust
/// use warden_types::{FailurePolicy, PolicyTable, ViolationKind};
///
/// let table = PolicyTable::new();
/// assert_eq!(table.for_kind(ViolationKind::SnapshotFailure), FailurePolicy::FailOpen);
/// assert_eq!(table.for_kind(ViolationKind::ValidationError), FailurePolicy::FailClosed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyTable {
    /// Policy for [`ViolationKind::SnapshotFailure`].
    pub snapshot_failure: FailurePolicy,
    /// Policy for [`ViolationKind::ValidationError`].
    pub validation_error: FailurePolicy,
}

impl PolicyTable {
    /// Default table: snapshot failures fail open, validation errors fail
    /// closed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            snapshot_failure: FailurePolicy::FailOpen,
            validation_error: FailurePolicy::FailClosed,
        }
    }

    /// Sets the snapshot failure policy.
    #[must_use]
    pub const fn with_snapshot_failure(mut self, policy: FailurePolicy) -> Self {
        self.snapshot_failure = policy;
        self
    }

    /// Sets the validation error policy.
    #[must_use]
    pub const fn with_validation_error(mut self, policy: FailurePolicy) -> Self {
        self.validation_error = policy;
        self
    }

    /// Policy applied to an event of `kind`.
    #[must_use]
    pub const fn for_kind(&self, kind: ViolationKind) -> FailurePolicy {
        match kind {
            ViolationKind::SnapshotFailure => self.snapshot_failure,
            ViolationKind::ValidationError => self.validation_error,
            ViolationKind::IntegrityViolation | ViolationKind::AddressAccessFault => {
                FailurePolicy::FailClosed
            }
        }
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new()
    }
}
