//! Error types for snapshot validation and monitoring.

use thiserror::Error;
use warden_fingerprint::FingerprintError;
use warden_guard::GuardError;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Faults inside the snapshot and validation pipelines.
///
/// None of these reach the host directly: the store turns them into
/// `SnapshotFailure` / `ValidationError` events and a boolean verdict.
///
/// # Security Notes
///
/// Messages name the field and the shape problem, never field contents.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The state could not be serialized or fingerprinted.
    #[error("fingerprinting failed: {0}")]
    Fingerprint(#[from] FingerprintError),

    /// Process metrics could not be sampled.
    #[error("process metrics unavailable: {0}")]
    Probe(#[from] GuardError),

    /// A monitored field does not have the shape the checks require.
    #[error("field '{field}' is malformed: {reason}")]
    MalformedField {
        /// Field name.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The background worker could not be started.
    #[error("failed to spawn monitor worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl MonitorError {
    pub(crate) fn malformed(field: &str, reason: impl Into<String>) -> Self {
        Self::MalformedField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
