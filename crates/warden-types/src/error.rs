//! Error types for shared Warden values.

use thiserror::Error;

/// Result type alias for operations in this crate.
pub type Result<T> = std::result::Result<T, TypesError>;

/// Errors raised while building shared values.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A host value did not serialize to a field map.
    #[error("tracked state must serialize to an object, got {found}")]
    NotAnObject {
        /// JSON type name that was produced instead.
        found: &'static str,
    },

    /// Serialization of a host value failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
