//! Error types for Warden Core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for facade operations.
pub type Result<T> = std::result::Result<T, WardenError>;

/// Core error type for configuration and wiring.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Configuration file could not be read.
    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for [`WardenConfig`](crate::WardenConfig).
    #[error("invalid config syntax: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration parsed but a value is out of range.
    #[error("configuration error: {0}")]
    Config(String),

    /// Guard error passthrough.
    #[error("guard error: {0}")]
    Guard(#[from] warden_guard::GuardError),

    /// Monitor error passthrough.
    #[error("monitor error: {0}")]
    Monitor(#[from] warden_monitor::MonitorError),
}
