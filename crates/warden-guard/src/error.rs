//! Error types for the OS guards.

use thiserror::Error;

/// Result type alias for guard operations.
pub type Result<T> = std::result::Result<T, GuardError>;

/// Errors raised by fallible guard operations.
///
/// Only metric sampling is fallible; scans and memory checks report
/// failure as `false`.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The current process id could not be determined.
    #[error("current process id unavailable: {0}")]
    PidUnavailable(String),

    /// The OS returned no information for the monitored process.
    #[error("process {pid} not visible to the system inspector")]
    ProcessUnavailable {
        /// Process id that was queried.
        pid: u32,
    },
}
