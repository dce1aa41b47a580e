//! The Warden facade.
//!
//! Wires a [`WardenConfig`] into a ready-to-start [`IntegrityMonitor`]:
//! the security log and an in-memory journal behind one fan-out sink, a
//! live snapshot store, the memory guard, and the environment guard when
//! environment checks are enabled. Key presses are checked by the
//! configured [`InputCadence`]; rejected input is recorded as an integrity
//! violation.

use crate::{config::WardenConfig, Result};

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};
use warden_guard::{MemoryRegionGuard, ProcessProbe};
use warden_monitor::{InputCadence, IntegrityMonitor, SnapshotStore};
use warden_types::{Clock, EventSink, FanoutSink, MemorySink, SecurityLog, ViolationEvent, ViolationKind};

/// A configured integrity monitor plus its event journal.
///
/// Every event reaches both the security log file and the journal, so the
/// host can inspect what happened without parsing the log. The journal
/// keeps the most recent `log.journal_capacity` events; its per-kind
/// counts cover the whole session.
///
/// # Example
///
/// ```rust,no_run
/// use warden_core::{Warden, WardenConfig};
/// use warden_types::TrackedState;
///
/// let warden = Warden::from_config(WardenConfig::default())?;
/// warden.monitor().start(TrackedState::new().with_field("score", 0))?;
/// // ... host loop ...
/// warden.monitor().stop();
/// assert_eq!(warden.integrity_violations(), 0);
/// # Ok::<(), warden_core::WardenError>(())
/// ```
pub struct Warden {
    config: WardenConfig,
    monitor: IntegrityMonitor,
    journal: Arc<MemorySink>,
    input: Mutex<InputCadence>,
}

impl Warden {
    /// Builds a monitor that samples the live process.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the current
    /// process cannot be inspected.
    pub fn from_config(config: WardenConfig) -> Result<Self> {
        config.validate()?;
        let journal = Arc::new(MemorySink::with_capacity(config.log.journal_capacity));
        let sink = Self::sink(&config, &journal);
        let store = SnapshotStore::live(config.store.to_store_config(), sink)?;
        Self::assemble(config, store, journal)
    }

    /// Builds a monitor that samples metrics from `probe`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, or if environment
    /// checks are enabled and the current process cannot be inspected.
    pub fn with_probe(config: WardenConfig, probe: Box<dyn ProcessProbe>) -> Result<Self> {
        config.validate()?;
        let journal = Arc::new(MemorySink::with_capacity(config.log.journal_capacity));
        let sink = Self::sink(&config, &journal);
        let store = SnapshotStore::new(config.store.to_store_config(), sink, probe);
        Self::assemble(config, store, journal)
    }

    fn sink(config: &WardenConfig, journal: &Arc<MemorySink>) -> Arc<dyn EventSink> {
        Arc::new(
            FanoutSink::new()
                .with_sink(Arc::new(SecurityLog::new(config.log.security_log.clone())))
                .with_sink(journal.clone()),
        )
    }

    fn assemble(config: WardenConfig, store: SnapshotStore, journal: Arc<MemorySink>) -> Result<Self> {
        let sink = store.sink();
        let memory = MemoryRegionGuard::new().with_region_size(config.guard.region_size);
        let monitor_config = config.monitor.to_monitor_config();

        // Replaces the default guard built by the monitor with the configured one.
        let monitor = if monitor_config.environment_checks {
            IntegrityMonitor::new(monitor_config, store, memory, sink)
                .with_environment_guard(config.guard.environment_guard()?)
        } else {
            IntegrityMonitor::new(monitor_config, store, memory, sink)
        };

        info!(
            "Warden initialized: interval {}ms, log {}",
            config.monitor.interval_ms,
            config.log.security_log.display()
        );

        let input = Mutex::new(config.input.to_input_cadence());
        Ok(Self {
            config,
            monitor,
            journal,
            input,
        })
    }

    /// Times key presses against `clock` instead of the system clock.
    #[must_use]
    pub fn with_input_clock(self, clock: Arc<dyn Clock>) -> Self {
        *self.input.lock() = self.config.input.to_input_cadence().with_clock(clock);
        self
    }

    /// Records a key press. Returns false once the input cadence looks
    /// scripted; the rejection is reported to the security log.
    pub fn validate_input(&self) -> bool {
        let mut input = self.input.lock();
        if input.validate_input() {
            return true;
        }
        let suspicious = input.suspicious_count();
        drop(input);

        warn!(suspicious, "input rejected");
        self.monitor.sink().record(&ViolationEvent::new(
            ViolationKind::IntegrityViolation,
            format!("Suspicious input timing detected: {suspicious} rapid inputs"),
        ));
        false
    }

    /// Forgets recorded key presses, e.g. when a new session starts.
    pub fn reset_input(&self) {
        self.input.lock().reset();
    }

    /// The integrity monitor.
    #[must_use]
    pub const fn monitor(&self) -> &IntegrityMonitor {
        &self.monitor
    }

    /// Recent events, with counts for the whole session.
    #[must_use]
    pub fn journal(&self) -> Arc<MemorySink> {
        self.journal.clone()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Number of integrity violations recorded so far.
    #[must_use]
    pub fn integrity_violations(&self) -> usize {
        self.journal.count_kind(ViolationKind::IntegrityViolation)
    }
}

impl std::fmt::Debug for Warden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warden")
            .field("config", &self.config)
            .field("state", &self.monitor.state())
            .field("events", &self.journal.len())
            .finish()
    }
}
