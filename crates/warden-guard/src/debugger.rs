//! # Debugger Detection
//!
//! Three indicators, checked in order:
//!
//! | Indicator | Source | Platforms |
//! |-----------|--------|-----------|
//! | Tracer attached | `TracerPid` line of `/proc/self/status` | Linux |
//! | Injection variable | process environment | all |
//! | Debugger module mapped | paths in `/proc/self/maps` | Linux |
//!
//! Evaluation is rate-limited: the indicators are re-read at most once per
//! [`DebuggerConfig::recheck_interval`]. A positive verdict latches until
//! [`DebuggerDetector::reset`].

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use warden_types::{Clock, SystemClock};

const DEFAULT_ENV_VARS: &[&str] = &["LD_PRELOAD", "LD_AUDIT", "DYLD_INSERT_LIBRARIES"];
const DEFAULT_MODULE_PATTERNS: &[&str] = &["frida", "gdbserver", "lldb", "vgpreload", "pydevd"];

/// Evidence that a debugger or injector is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebuggerIndicator {
    /// A tracer process is attached.
    Tracer {
        /// Pid of the tracer.
        pid: u32,
    },
    /// A configured environment variable is set.
    EnvironmentVariable {
        /// Variable name.
        name: String,
    },
    /// A mapped module path matches the deny-list.
    Module {
        /// Mapped path.
        path: String,
        /// Deny-list entry that matched.
        pattern: String,
    },
}

impl std::fmt::Display for DebuggerIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tracer { pid } => write!(f, "tracer attached (pid {pid})"),
            Self::EnvironmentVariable { name } => write!(f, "environment variable {name} set"),
            Self::Module { path, pattern } => write!(f, "module {path} matches '{pattern}'"),
        }
    }
}

/// Debugger detector configuration.
#[derive(Debug, Clone)]
pub struct DebuggerConfig {
    /// Minimum time between two evaluations.
    pub recheck_interval: Duration,
    /// Whether to read the tracer pid.
    pub check_tracer: bool,
    /// Environment variables whose presence counts as an indicator.
    pub env_vars: Vec<String>,
    /// Case-insensitive substrings matched against mapped module paths.
    pub module_patterns: Vec<String>,
    /// Process status file.
    pub status_path: PathBuf,
    /// Process memory map file.
    pub maps_path: PathBuf,
}

impl DebuggerConfig {
    /// Default configuration: 1 s re-check, tracer check on, default
    /// variable and module lists.
    #[must_use]
    pub fn new() -> Self {
        Self {
            recheck_interval: Duration::from_secs(1),
            check_tracer: true,
            env_vars: DEFAULT_ENV_VARS.iter().map(|s| (*s).to_string()).collect(),
            module_patterns: DEFAULT_MODULE_PATTERNS.iter().map(|s| (*s).to_string()).collect(),
            status_path: PathBuf::from("/proc/self/status"),
            maps_path: PathBuf::from("/proc/self/maps"),
        }
    }

    /// Sets the re-check interval.
    #[must_use]
    pub fn with_recheck_interval(mut self, interval: Duration) -> Self {
        self.recheck_interval = interval;
        self
    }

    /// Enables or disables the tracer check.
    #[must_use]
    pub fn with_tracer_check(mut self, enabled: bool) -> Self {
        self.check_tracer = enabled;
        self
    }

    /// Replaces the environment variable list.
    #[must_use]
    pub fn with_env_vars<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_vars = vars.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the module deny-list. Entries are lowercased.
    #[must_use]
    pub fn with_module_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.module_patterns = patterns.into_iter().map(|s| s.into().to_lowercase()).collect();
        self
    }

    /// Reads process status and memory maps from other files.
    #[must_use]
    pub fn with_proc_paths(mut self, status: impl Into<PathBuf>, maps: impl Into<PathBuf>) -> Self {
        self.status_path = status.into();
        self.maps_path = maps.into();
        self
    }
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate-limited, latching debugger detector.
///
/// # Example
///
/// ```rust
/// use warden_guard::{DebuggerConfig, DebuggerDetector};
///
/// let mut detector = DebuggerDetector::new(
///     DebuggerConfig::new().with_env_vars(["WARDEN_DOC_UNSET_VARIABLE"]),
/// );
/// let _present = detector.is_debugger_present();
/// assert_eq!(detector.check_count(), 1);
/// ```
#[derive(Debug)]
pub struct DebuggerDetector {
    config: DebuggerConfig,
    clock: Arc<dyn Clock>,
    last_check: Option<Instant>,
    indicator: Option<DebuggerIndicator>,
    check_count: u64,
}

impl DebuggerDetector {
    /// Creates a detector using the system clock.
    #[must_use]
    pub fn new(config: DebuggerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            last_check: None,
            indicator: None,
            check_count: 0,
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    /// Returns the verdict, re-evaluating the indicators if the re-check
    /// interval has passed. The first call always evaluates.
    pub fn is_debugger_present(&mut self) -> bool {
        if self.indicator.is_some() {
            return true;
        }

        let now = self.clock.now();
        if let Some(last) = self.last_check {
            if now.duration_since(last) < self.config.recheck_interval {
                return false;
            }
        }
        self.last_check = Some(now);
        self.check_count += 1;

        self.indicator = self.evaluate();
        match &self.indicator {
            Some(indicator) => {
                warn!(%indicator, "debugger detected");
                true
            }
            None => {
                debug!(checks = self.check_count, "no debugger indicators");
                false
            }
        }
    }

    /// Latched indicator, if one was found.
    #[must_use]
    pub fn indicator(&self) -> Option<&DebuggerIndicator> {
        self.indicator.as_ref()
    }

    /// Number of evaluations performed (rate-limited calls excluded).
    #[must_use]
    pub fn check_count(&self) -> u64 {
        self.check_count
    }

    /// Clears the latched verdict and the rate limit.
    pub fn reset(&mut self) {
        self.indicator = None;
        self.last_check = None;
    }

    fn evaluate(&self) -> Option<DebuggerIndicator> {
        if self.config.check_tracer {
            if let Some(pid) = self.tracer_pid() {
                return Some(DebuggerIndicator::Tracer { pid });
            }
        }

        if let Some(name) = self
            .config
            .env_vars
            .iter()
            .find(|name| std::env::var_os(name.as_str()).is_some())
        {
            return Some(DebuggerIndicator::EnvironmentVariable { name: name.clone() });
        }

        self.suspicious_module()
    }

    /// Non-zero `TracerPid` from the status file. Missing file means no
    /// tracer information is available on this platform.
    fn tracer_pid(&self) -> Option<u32> {
        let status = fs::read_to_string(&self.config.status_path).ok()?;
        parse_tracer_pid(&status).filter(|pid| *pid != 0)
    }

    fn suspicious_module(&self) -> Option<DebuggerIndicator> {
        if self.config.module_patterns.is_empty() {
            return None;
        }
        let maps = fs::read_to_string(&self.config.maps_path).ok()?;
        maps.lines()
            .filter_map(mapped_path)
            .find_map(|path| {
                let lower = path.to_lowercase();
                self.config
                    .module_patterns
                    .iter()
                    .find(|p| !p.is_empty() && lower.contains(p.as_str()))
                    .map(|pattern| DebuggerIndicator::Module {
                        path: path.to_string(),
                        pattern: pattern.clone(),
                    })
            })
    }
}

impl Default for DebuggerDetector {
    fn default() -> Self {
        Self::new(DebuggerConfig::default())
    }
}

fn parse_tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|rest| rest.trim().parse().ok())
}

/// Path column of a `/proc/<pid>/maps` line (the sixth field), if any.
fn mapped_path(line: &str) -> Option<&str> {
    let mut rest = line;
    for _ in 0..5 {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        rest = &rest[end..];
    }
    let path = rest.trim();
    path.starts_with('/').then_some(path)
}
