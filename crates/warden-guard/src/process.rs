//! # Process Environment Guard
//!
//! Samples the monitored process's own resource usage and scans the host
//! process list against a deny-list of substrings.
//!
//! ## Threat Model
//!
//! - **Memory editors / trainers** running alongside the game
//!   (process names containing "cheat", "hack", "memory", ...)
//! - **Injected code** inflating CPU load, memory or thread count between
//!   snapshots (caught by comparing [`ProcessMetrics`])
//!
//! Both are coarse: see the crate-level security notes.

use crate::debugger::DebuggerDetector;
use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};
use tracing::{debug, warn};

/// Substrings that mark a process as suspicious (case-insensitive).
pub const DEFAULT_PROCESS_DENY_LIST: &[&str] = &["cheat", "inject", "debug", "memory", "hack"];

/// Resource usage of the monitored process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    /// CPU usage in percent of one core since the previous sample.
    pub cpu_load: f32,
    /// Resident set size in bytes.
    pub resident_memory_bytes: u64,
    /// Number of threads.
    pub thread_count: usize,
}

/// Source of own-process metrics.
///
/// [`ProcessEnvironmentGuard`] is the production implementation; the
/// snapshot store only depends on this trait.
pub trait ProcessProbe: Send {
    /// Samples the current process.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS provides no information for the process.
    fn sample_self(&mut self) -> Result<ProcessMetrics>;
}

/// A process list entry that matched the deny-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspiciousProcess {
    /// Process id.
    pub pid: u32,
    /// Process name.
    pub name: String,
    /// Deny-list entry that matched.
    pub pattern: String,
}

/// Returns the first deny-list entry contained in `haystack`, ignoring
/// case.
///
/// # Example
///
/// ```rust
/// use warden_guard::match_deny_list;
///
/// let deny = vec!["cheat".to_string(), "inject".to_string()];
/// assert_eq!(match_deny_list("CheatEngine-x86_64", &deny), Some("cheat"));
/// assert_eq!(match_deny_list("bash --login", &deny), None);
/// ```
#[must_use]
pub fn match_deny_list<'a>(haystack: &str, deny_list: &'a [String]) -> Option<&'a str> {
    let haystack = haystack.to_lowercase();
    deny_list
        .iter()
        .find(|pattern| !pattern.is_empty() && haystack.contains(pattern.as_str()))
        .map(String::as_str)
}

/// OS-level inspection of the monitored process and its neighbors.
///
/// # Example
///
/// ```rust,no_run
/// use warden_guard::ProcessEnvironmentGuard;
///
/// let mut guard = ProcessEnvironmentGuard::new()?;
/// let metrics = guard.sample_self()?;
/// println!("rss = {} bytes", metrics.resident_memory_bytes);
///
/// if !guard.scan_process_list() {
///     eprintln!("suspicious environment detected");
/// }
/// # Ok::<(), warden_guard::GuardError>(())
/// ```
pub struct ProcessEnvironmentGuard {
    system: System,
    pid: Pid,
    deny_list: Vec<String>,
    debugger: DebuggerDetector,
}

impl ProcessEnvironmentGuard {
    /// Creates a guard for the current process with the default deny-list
    /// and debugger detector.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::PidUnavailable`] on platforms where the
    /// current process id cannot be read.
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| GuardError::PidUnavailable(e.to_string()))?;
        Ok(Self {
            system: System::new(),
            pid,
            deny_list: DEFAULT_PROCESS_DENY_LIST.iter().map(|s| (*s).to_string()).collect(),
            debugger: DebuggerDetector::default(),
        })
    }

    /// Replaces the process deny-list. Entries are lowercased.
    #[must_use]
    pub fn with_deny_list<I, S>(mut self, deny_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny_list = deny_list.into_iter().map(|s| s.into().to_lowercase()).collect();
        self
    }

    /// Replaces the debugger detector.
    #[must_use]
    pub fn with_debugger(mut self, detector: DebuggerDetector) -> Self {
        self.debugger = detector;
        self
    }

    /// Process id being monitored.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid.as_u32()
    }

    /// Current deny-list.
    #[must_use]
    pub fn deny_list(&self) -> &[String] {
        &self.deny_list
    }

    /// Samples CPU load, resident memory and thread count of this process.
    ///
    /// CPU load is computed by the OS inspector relative to the previous
    /// refresh, so the first sample after construction reads as 0.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::ProcessUnavailable`] if the process is not
    /// visible (e.g. restricted `/proc`).
    pub fn sample_self(&mut self) -> Result<ProcessMetrics> {
        self.system.refresh_process(self.pid);
        let process = self
            .system
            .process(self.pid)
            .ok_or(GuardError::ProcessUnavailable { pid: self.pid.as_u32() })?;

        let metrics = ProcessMetrics {
            cpu_load: process.cpu_usage(),
            resident_memory_bytes: process.memory(),
            thread_count: process.tasks().map_or(1, |tasks| tasks.len().max(1)),
        };
        debug!(
            cpu = metrics.cpu_load,
            rss = metrics.resident_memory_bytes,
            threads = metrics.thread_count,
            "sampled own process"
        );
        Ok(metrics)
    }

    /// Returns the first other process whose name or command line contains
    /// a deny-list entry.
    pub fn find_suspicious_process(&mut self) -> Option<SuspiciousProcess> {
        self.system.refresh_processes();

        for (pid, process) in self.system.processes() {
            if *pid == self.pid {
                continue;
            }
            let haystack = format!("{} {}", process.name(), process.cmd().join(" "));
            if let Some(pattern) = match_deny_list(&haystack, &self.deny_list) {
                return Some(SuspiciousProcess {
                    pid: pid.as_u32(),
                    name: process.name().to_string(),
                    pattern: pattern.to_string(),
                });
            }
        }
        None
    }

    /// Scans the process list. Returns `true` if no process matched.
    pub fn scan_process_list(&mut self) -> bool {
        match self.find_suspicious_process() {
            Some(found) => {
                warn!(
                    pid = found.pid,
                    name = %found.name,
                    pattern = %found.pattern,
                    "suspicious environment detected"
                );
                false
            }
            None => true,
        }
    }

    /// Rate-limited debugger check; see [`DebuggerDetector`].
    pub fn detect_debugger_present(&mut self) -> bool {
        self.debugger.is_debugger_present()
    }

    /// Access to the debugger detector (indicator, counters, reset).
    pub fn debugger_mut(&mut self) -> &mut DebuggerDetector {
        &mut self.debugger
    }
}

impl ProcessProbe for ProcessEnvironmentGuard {
    fn sample_self(&mut self) -> Result<ProcessMetrics> {
        Self::sample_self(self)
    }
}

impl std::fmt::Debug for ProcessEnvironmentGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessEnvironmentGuard")
            .field("pid", &self.pid.as_u32())
            .field("deny_list", &self.deny_list)
            .field("debugger", &self.debugger)
            .finish_non_exhaustive()
    }
}
