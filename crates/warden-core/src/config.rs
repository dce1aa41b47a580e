//! Configuration types for Warden.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or a
//! file with only the sections you care about) is a valid configuration.
//!
//! ```toml
//! [store]
//! rate_limit_ms = 100
//! frozen_fields = ["shapes"]
//!
//! [store.policy]
//! snapshot_failure = "fail_open"
//! validation_error = "fail_closed"
//!
//! [monitor]
//! interval_ms = 1000
//! environment_checks = true
//!
//! [guard]
//! process_deny_list = ["cheat", "inject", "debug", "memory", "hack"]
//!
//! [input]
//! min_interval_ms = 50
//!
//! [log]
//! security_log = "security_log.txt"
//! journal_capacity = 1024
//! ```

use crate::error::{Result, WardenError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use warden_guard::{DebuggerConfig, DebuggerDetector, ProcessEnvironmentGuard, DEFAULT_PROCESS_DENY_LIST, DEFAULT_REGION_SIZE};
use warden_monitor::{InputCadence, MonitorConfig, StoreConfig};
use warden_types::PolicyTable;

/// Configuration for the Warden facade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Snapshot store thresholds and policies.
    pub store: StoreSection,

    /// Background monitor scheduling.
    pub monitor: MonitorSection,

    /// Process, debugger and memory guards.
    pub guard: GuardSection,

    /// Key-press cadence validation.
    pub input: InputSection,

    /// Security log.
    pub log: LogSection,
}

impl WardenConfig {
    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// holds an out-of-range value.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WardenError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid syntax or an out-of-range value.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| WardenError::Config(e.to_string()))
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, why: &str| Err(WardenError::Config(format!("{key}: {why}")));

        if self.monitor.interval_ms == 0 {
            return invalid("monitor.interval_ms", "must be greater than zero");
        }
        if self.monitor.stop_timeout_ms == 0 {
            return invalid("monitor.stop_timeout_ms", "must be greater than zero");
        }
        if !(self.store.cpu_delta_threshold.is_finite() && self.store.cpu_delta_threshold >= 0.0) {
            return invalid("store.cpu_delta_threshold", "must be a non-negative number");
        }
        if self.store.score_jump_threshold < 0 {
            return invalid("store.score_jump_threshold", "must not be negative");
        }
        if self.store.ledger_window_secs == 0 {
            return invalid("store.ledger_window_secs", "must be greater than zero");
        }
        if self.store.score_field.is_empty() || self.store.board_field.is_empty() {
            return invalid("store", "score_field and board_field must be non-empty");
        }
        if self.store.frozen_fields.iter().any(String::is_empty) {
            return invalid("store.frozen_fields", "entries must be non-empty");
        }
        if self.guard.region_size == 0 {
            return invalid("guard.region_size", "must be greater than zero");
        }
        if self.guard.process_deny_list.iter().any(String::is_empty) {
            return invalid("guard.process_deny_list", "entries must be non-empty");
        }
        if self.input.history == 0 || self.input.max_suspicious == 0 {
            return invalid("input", "history and max_suspicious must be greater than zero");
        }
        if self.log.journal_capacity == 0 {
            return invalid("log.journal_capacity", "must be greater than zero");
        }
        Ok(())
    }
}

/// Snapshot store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Minimum milliseconds between two full validations.
    pub rate_limit_ms: u64,

    /// Maximum CPU load difference in percentage points.
    pub cpu_delta_threshold: f32,

    /// Maximum resident memory difference in bytes.
    pub memory_delta_threshold: u64,

    /// Maximum score increase in one step.
    pub score_jump_threshold: i64,

    /// Maximum differing board cells in one step.
    pub board_change_threshold: usize,

    /// Score ledger window in seconds.
    pub ledger_window_secs: u64,

    /// Score changes that must be exceeded before cadence is checked.
    pub ledger_event_threshold: usize,

    /// Minimum mean milliseconds between score changes.
    pub min_mean_interval_ms: u64,

    /// Regularity tolerance in milliseconds.
    pub regularity_tolerance_ms: u64,

    /// Name of the score field.
    pub score_field: String,

    /// Name of the board field.
    pub board_field: String,

    /// Fields that must never change during a session.
    pub frozen_fields: Vec<String>,

    /// Fail-open / fail-closed decisions.
    pub policy: PolicyTable,
}

impl Default for StoreSection {
    fn default() -> Self {
        let defaults = StoreConfig::new();
        Self {
            rate_limit_ms: millis(defaults.rate_limit),
            cpu_delta_threshold: defaults.cpu_delta_threshold,
            memory_delta_threshold: defaults.memory_delta_threshold,
            score_jump_threshold: defaults.score_jump_threshold,
            board_change_threshold: defaults.board_change_threshold,
            ledger_window_secs: defaults.ledger_window.as_secs(),
            ledger_event_threshold: defaults.ledger_event_threshold,
            min_mean_interval_ms: millis(defaults.min_mean_interval),
            regularity_tolerance_ms: millis(defaults.regularity_tolerance),
            score_field: defaults.score_field,
            board_field: defaults.board_field,
            frozen_fields: defaults.frozen_fields,
            policy: defaults.policy,
        }
    }
}

impl StoreSection {
    /// Builds the store configuration.
    #[must_use]
    pub fn to_store_config(&self) -> StoreConfig {
        let mut config = StoreConfig::new()
            .with_rate_limit(Duration::from_millis(self.rate_limit_ms))
            .with_cpu_delta_threshold(self.cpu_delta_threshold)
            .with_memory_delta_threshold(self.memory_delta_threshold)
            .with_score_jump_threshold(self.score_jump_threshold)
            .with_board_change_threshold(self.board_change_threshold)
            .with_ledger_window(Duration::from_secs(self.ledger_window_secs))
            .with_ledger_event_threshold(self.ledger_event_threshold)
            .with_min_mean_interval(Duration::from_millis(self.min_mean_interval_ms))
            .with_regularity_tolerance(Duration::from_millis(self.regularity_tolerance_ms))
            .with_frozen_fields(self.frozen_fields.iter().cloned())
            .with_policy(self.policy);
        config.score_field.clone_from(&self.score_field);
        config.board_field.clone_from(&self.board_field);
        config
    }
}

/// Background monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Milliseconds between ticks.
    pub interval_ms: u64,

    /// Milliseconds `stop` waits for the worker.
    pub stop_timeout_ms: u64,

    /// Scan the process list and check for debuggers on every tick.
    pub environment_checks: bool,
}

impl Default for MonitorSection {
    fn default() -> Self {
        let defaults = MonitorConfig::new();
        Self {
            interval_ms: millis(defaults.interval),
            stop_timeout_ms: millis(defaults.stop_timeout),
            environment_checks: defaults.environment_checks,
        }
    }
}

impl MonitorSection {
    /// Builds the monitor configuration.
    #[must_use]
    pub fn to_monitor_config(&self) -> MonitorConfig {
        MonitorConfig::new()
            .with_interval(Duration::from_millis(self.interval_ms))
            .with_stop_timeout(Duration::from_millis(self.stop_timeout_ms))
            .with_environment_checks(self.environment_checks)
    }
}

/// Guard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSection {
    /// Bytes watched per registered address.
    pub region_size: usize,

    /// Case-insensitive substrings that flag a process.
    pub process_deny_list: Vec<String>,

    /// Milliseconds between two debugger evaluations.
    pub debugger_recheck_ms: u64,

    /// Check for an attached tracer.
    pub check_tracer: bool,

    /// Environment variables that indicate injection or debugging.
    pub debugger_env_vars: Vec<String>,

    /// Module path substrings that indicate a debugger.
    pub debugger_module_patterns: Vec<String>,
}

impl Default for GuardSection {
    fn default() -> Self {
        let debugger = DebuggerConfig::new();
        Self {
            region_size: DEFAULT_REGION_SIZE,
            process_deny_list: DEFAULT_PROCESS_DENY_LIST.iter().map(|s| (*s).to_string()).collect(),
            debugger_recheck_ms: millis(debugger.recheck_interval),
            check_tracer: debugger.check_tracer,
            debugger_env_vars: debugger.env_vars,
            debugger_module_patterns: debugger.module_patterns,
        }
    }
}

impl GuardSection {
    /// Builds the debugger detector configuration.
    #[must_use]
    pub fn to_debugger_config(&self) -> DebuggerConfig {
        DebuggerConfig::new()
            .with_recheck_interval(Duration::from_millis(self.debugger_recheck_ms))
            .with_tracer_check(self.check_tracer)
            .with_env_vars(self.debugger_env_vars.iter().cloned())
            .with_module_patterns(self.debugger_module_patterns.iter().cloned())
    }

    /// Builds a live environment guard with this deny-list and detector.
    ///
    /// # Errors
    ///
    /// Returns an error if the current process cannot be inspected.
    pub fn environment_guard(&self) -> Result<ProcessEnvironmentGuard> {
        Ok(ProcessEnvironmentGuard::new()?
            .with_deny_list(self.process_deny_list.iter().cloned())
            .with_debugger(DebuggerDetector::new(self.to_debugger_config())))
    }
}

/// Key-press cadence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSection {
    /// Presses closer together than this raise suspicion.
    pub min_interval_ms: u64,

    /// Suspicion level at which input is rejected.
    pub max_suspicious: u32,

    /// Press times remembered.
    pub history: usize,
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            min_interval_ms: 50,
            max_suspicious: 5,
            history: 10,
        }
    }
}

impl InputSection {
    /// Builds the key-press validator.
    #[must_use]
    pub fn to_input_cadence(&self) -> InputCadence {
        InputCadence::new()
            .with_capacity(self.history)
            .with_min_interval(Duration::from_millis(self.min_interval_ms))
            .with_max_suspicious(self.max_suspicious)
    }
}

/// Security log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Append-only security event log.
    pub security_log: PathBuf,

    /// Events kept in the in-memory journal; older ones are dropped.
    pub journal_capacity: usize,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            security_log: PathBuf::from("security_log.txt"),
            journal_capacity: 1024,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
