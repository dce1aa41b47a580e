//! Violation events.
//!
//! A [`ViolationEvent`] is the unit of the forensic trail. Events are
//! created once, handed to an [`EventSink`](crate::EventSink), and never
//! mutated afterwards.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a recorded failure.
///
/// | Kind | Cause | Default policy |
/// |------|-------|----------------|
/// | `SnapshotFailure` | Snapshot pipeline could not complete | fail-open |
/// | `ValidationError` | Unexpected fault while validating | fail-closed |
/// | `IntegrityViolation` | A heuristic detected tampering | always fail-closed |
/// | `AddressAccessFault` | A raw memory read failed | reported as `false` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Serialization, fingerprinting or metric sampling failed while
    /// building a snapshot.
    SnapshotFailure,
    /// The validation pipeline itself faulted.
    ValidationError,
    /// Tampering was detected.
    IntegrityViolation,
    /// A monitored address could not be read.
    AddressAccessFault,
}

impl ViolationKind {
    /// Severity used when an event of this kind is raised without an
    /// explicit override.
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::SnapshotFailure => Severity::Warning,
            Self::ValidationError | Self::AddressAccessFault => Severity::Error,
            Self::IntegrityViolation => Severity::Critical,
        }
    }

    /// Stable lowercase name used in log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SnapshotFailure => "snapshot_failure",
            Self::ValidationError => "validation_error",
            Self::IntegrityViolation => "integrity_violation",
            Self::AddressAccessFault => "address_access_fault",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a violation event, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; no action taken.
    Info,
    /// Degraded operation; monitoring continues.
    Warning,
    /// A check failed.
    Error,
    /// Tampering detected; the monitor stops.
    Critical,
}

impl Severity {
    /// Stable uppercase name used in log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only record of a failure or detection.
///
/// # Example
///
/// ```rust
/// use warden_types::{Severity, ViolationEvent, ViolationKind};
///
/// let event = ViolationEvent::new(ViolationKind::IntegrityViolation, "score jumped by 1100");
/// assert_eq!(event.severity(), Severity::Critical);
/// assert!(event.log_line().contains("SECURITY EVENT"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    timestamp: DateTime<Utc>,
    severity: Severity,
    message: String,
    kind: ViolationKind,
}

impl ViolationEvent {
    /// Creates an event stamped with the current wall-clock time and the
    /// kind's default severity.
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self::with_severity(kind, kind.default_severity(), message)
    }

    /// Creates an event with an explicit severity.
    pub fn with_severity(kind: ViolationKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            kind,
        }
    }

    /// Wall-clock time the event was created.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Severity of the event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Failure category.
    #[must_use]
    pub const fn kind(&self) -> ViolationKind {
        self.kind
    }

    /// Renders the single line written to the security log (no newline).
    #[must_use]
    pub fn log_line(&self) -> String {
        format!(
            "[{}] SECURITY EVENT [{}/{}]: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.severity,
            self.kind,
            self.message
        )
    }

    /// Mirrors the event to `tracing` at a level matching its severity.
    pub fn trace(&self) {
        match self.severity {
            Severity::Info => tracing::info!(kind = %self.kind, "{}", self.message),
            Severity::Warning => tracing::warn!(kind = %self.kind, "{}", self.message),
            Severity::Error | Severity::Critical => {
                tracing::error!(kind = %self.kind, severity = %self.severity, "{}", self.message);
            }
        }
    }
}
