//! Error types for fingerprinting.

use thiserror::Error;

/// Result type alias for fingerprint operations.
pub type Result<T> = std::result::Result<T, FingerprintError>;

/// Errors raised by the fingerprint pipeline.
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// The input could not be converted to JSON (for example a map with
    /// non-string keys).
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
