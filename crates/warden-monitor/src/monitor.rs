//! # Integrity Monitor
//!
//! Background loop that periodically validates the tracked state, scans
//! watched memory and (optionally) the process environment, and stops
//! itself on the first violation.
//!
//! ## Lifecycle
//!
//! ```text
//!            start                 stop / violation
//!   Idle ───────────────▶ Running ──────────────────▶ Stopped
//!    ▲                                                   │
//!    └──────────────────── reset / start ────────────────┘
//! ```
//!
//! `start` while Running is a no-op. `start` from Stopped performs the
//! reset itself, so every run begins with an empty store and a fresh
//! snapshot. The monitor never restarts on its own.
//!
//! ## Concurrency
//!
//! One lock guards the store, the memory guard and the lifecycle. Critical
//! sections are short; the worker never sleeps while holding it, and the
//! process scan runs outside it.
//!
//! The host's live state sits in a [`StateView`] the host may write at any
//! time. Each tick validates the view's current content against the
//! snapshot; `start` and `update_game_state` write the view and re-snapshot
//! under the core lock, so a tick never sees one without the other. The worker sleeps on
//! a shutdown channel so `stop` wakes it immediately; `stop` waits for the
//! worker for at most `stop_timeout` and then detaches it.
//!
//! Each run gets a generation number. A worker that outlives its run
//! (detached after a timeout) sees a newer generation and exits without
//! touching the new run.
//!
//! ## Security Notes
//!
//! - Violations are recorded BEFORE the lifecycle moves to Stopped
//! - The violation callback runs outside every lock
//! - Hosts must poll [`IntegrityMonitor::state`] or register a callback;
//!   the monitor never terminates the host process

use crate::error::Result;
use crate::store::SnapshotStore;
use crate::view::StateView;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use warden_guard::{MemoryRegionGuard, ProcessEnvironmentGuard, RegionFault};
use warden_types::{EventSink, TrackedState, ViolationEvent, ViolationKind};

/// Callback invoked with the event that stopped the monitor.
pub type ViolationCallback = Arc<dyn Fn(&ViolationEvent) + Send + Sync>;

/// Configuration for [`IntegrityMonitor`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use warden_monitor::MonitorConfig;
///
/// let config = MonitorConfig::new()
///     .with_interval(Duration::from_millis(250))
///     .with_environment_checks(true);
/// assert_eq!(config.stop_timeout, Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Time between two ticks.
    pub interval: Duration,
    /// Maximum time `stop` waits for the worker.
    pub stop_timeout: Duration,
    /// Run the process scan and debugger check on every tick.
    pub environment_checks: bool,
}

impl MonitorConfig {
    /// Creates a config with a 1 s interval, a 1 s stop timeout and
    /// environment checks disabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            interval: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(1),
            environment_checks: false,
        }
    }

    /// Sets the tick interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the stop timeout.
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Enables or disables environment checks.
    #[must_use]
    pub const fn with_environment_checks(mut self, enabled: bool) -> Self {
        self.environment_checks = enabled;
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Monitor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Not started, or reset after a stop.
    Idle,
    /// The background loop is active.
    Running,
    /// Stopped explicitly or by a violation.
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}

/// Result of one monitor tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Every check passed.
    Clean,
    /// The monitor is not running (or the run changed); nothing was checked.
    Inactive,
    /// A violation stopped the monitor.
    Violation(ViolationEvent),
}

impl CheckOutcome {
    /// Returns true for [`CheckOutcome::Violation`].
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        matches!(self, Self::Violation(_))
    }
}

struct Core {
    store: SnapshotStore,
    memory: MemoryRegionGuard,
    lifecycle: LifecycleState,
    generation: u64,
}

struct Shared {
    core: Mutex<Core>,
    view: StateView,
    environment: Mutex<Option<ProcessEnvironmentGuard>>,
    callback: Mutex<Option<ViolationCallback>>,
    sink: Arc<dyn EventSink>,
    config: MonitorConfig,
}

impl Shared {
    /// One loop body. `generation` pins the run a background worker
    /// belongs to; synchronous checks pass `None`.
    fn tick(&self, generation: Option<u64>) -> CheckOutcome {
        {
            let mut guard = self.core.lock();
            if !is_current(&guard, generation) {
                return CheckOutcome::Inactive;
            }
            let core = &mut *guard;

            let current = self.view.get();
            if !core.store.validate_state(&current) {
                return CheckOutcome::Violation(self.violate(core, "state validation failed"));
            }

            if let Err(fault) = core.memory.check_all() {
                let (kind, message) = match fault {
                    RegionFault::Unreadable { address } => (
                        ViolationKind::AddressAccessFault,
                        format!("Unpermitted memory access detected at {address:#x}"),
                    ),
                    RegionFault::Modified { address } => (
                        ViolationKind::IntegrityViolation,
                        format!("Memory modification detected at {address:#x}"),
                    ),
                };
                self.record(&ViolationEvent::new(kind, message));
                return CheckOutcome::Violation(self.violate(core, &fault.to_string()));
            }
        }

        if self.config.environment_checks {
            if let Some(cause) = self.scan_environment() {
                self.record(&ViolationEvent::new(ViolationKind::IntegrityViolation, cause.clone()));
                let mut guard = self.core.lock();
                if !is_current(&guard, generation) {
                    return CheckOutcome::Inactive;
                }
                return CheckOutcome::Violation(self.violate(&mut guard, &cause));
            }
        }

        CheckOutcome::Clean
    }

    /// Process scan and debugger check. Runs without the core lock.
    fn scan_environment(&self) -> Option<String> {
        let mut environment = self.environment.lock();
        let guard = environment.as_mut()?;

        if let Some(found) = guard.find_suspicious_process() {
            return Some(format!("Suspicious process detected: {}", found.name));
        }
        if guard.detect_debugger_present() {
            let indicator = guard
                .debugger_mut()
                .indicator()
                .map_or_else(|| "unknown indicator".to_string(), ToString::to_string);
            return Some(format!("Debugger detected: {indicator}"));
        }
        None
    }

    /// Records the monitor-level violation and stops the run.
    fn violate(&self, core: &mut Core, cause: &str) -> ViolationEvent {
        let event = ViolationEvent::new(
            ViolationKind::IntegrityViolation,
            format!("Integrity violation detected, initiating response ({cause})"),
        );
        self.record(&event);
        core.lifecycle = LifecycleState::Stopped;
        event
    }

    fn record(&self, event: &ViolationEvent) {
        event.trace();
        self.sink.record(event);
    }

    fn notify(&self, event: &ViolationEvent) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }
}

fn is_current(core: &Core, generation: Option<u64>) -> bool {
    core.lifecycle == LifecycleState::Running && generation.map_or(true, |g| g == core.generation)
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown: Sender<()>,
    done: Receiver<()>,
    generation: u64,
}

impl Worker {
    /// Signals the worker and waits up to `timeout` for it to finish.
    fn finish(self, timeout: Duration) {
        let _ = self.shutdown.try_send(());

        if self.handle.thread().id() == thread::current().id() {
            debug!(generation = self.generation, "stop called from the worker itself");
            return;
        }

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    warn!(generation = self.generation, "monitor worker panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    generation = self.generation,
                    timeout_ms = timeout.as_millis() as u64,
                    "monitor worker did not exit in time, detaching"
                );
            }
        }
    }
}

fn run_worker(shared: Arc<Shared>, generation: u64, shutdown: Receiver<()>, done: Sender<()>) {
    debug!(generation, "monitor worker started");
    loop {
        match shutdown.recv_timeout(shared.config.interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        match shared.tick(Some(generation)) {
            CheckOutcome::Clean => {}
            CheckOutcome::Inactive => break,
            CheckOutcome::Violation(event) => {
                shared.notify(&event);
                break;
            }
        }
    }
    debug!(generation, "monitor worker exiting");
    let _ = done.send(());
}

/// Periodic integrity checks over a host's tracked state.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use warden_guard::MemoryRegionGuard;
/// use warden_monitor::{IntegrityMonitor, LifecycleState, MonitorConfig, SnapshotStore, StoreConfig};
/// use warden_types::{SecurityLog, TrackedState};
///
/// let sink = Arc::new(SecurityLog::new("security_log.txt"));
/// let store = SnapshotStore::live(StoreConfig::new(), sink.clone())?;
/// let monitor = IntegrityMonitor::new(MonitorConfig::new(), store, MemoryRegionGuard::new(), sink);
///
/// monitor.on_violation(|event| eprintln!("session aborted: {}", event.message()));
///
/// let state = TrackedState::new().with_field("score", 0);
/// assert_eq!(monitor.start(state)?, LifecycleState::Running);
///
/// // ... host loop calls monitor.update_game_state(...) after each move ...
///
/// monitor.stop();
/// # Ok::<(), warden_monitor::MonitorError>(())
/// ```
pub struct IntegrityMonitor {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl IntegrityMonitor {
    /// Creates an idle monitor owning `store` and `memory`.
    ///
    /// With environment checks enabled a live [`ProcessEnvironmentGuard`]
    /// is created; if the process cannot be inspected the checks are
    /// skipped with a warning.
    pub fn new(
        config: MonitorConfig,
        store: SnapshotStore,
        memory: MemoryRegionGuard,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let environment = if config.environment_checks {
            match ProcessEnvironmentGuard::new() {
                Ok(guard) => Some(guard),
                Err(e) => {
                    warn!("environment checks disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    store,
                    memory,
                    lifecycle: LifecycleState::Idle,
                    generation: 0,
                }),
                view: StateView::default(),
                environment: Mutex::new(environment),
                callback: Mutex::new(None),
                sink,
                config,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Replaces the environment guard used when environment checks are on.
    #[must_use]
    pub fn with_environment_guard(self, guard: ProcessEnvironmentGuard) -> Self {
        *self.shared.environment.lock() = Some(guard);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> MonitorConfig {
        self.shared.config
    }

    /// Registers the callback run when a violation stops the monitor.
    pub fn on_violation<F>(&self, callback: F)
    where
        F: Fn(&ViolationEvent) + Send + Sync + 'static,
    {
        *self.shared.callback.lock() = Some(Arc::new(callback));
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shared.core.lock().lifecycle
    }

    /// Returns true while the background loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Starts a run: resets the store, snapshots `state`, publishes it to
    /// the [`StateView`] and launches the background loop. No-op while
    /// Running.
    ///
    /// If the initial snapshot fails under a fail-closed snapshot policy
    /// the run is refused and the monitor ends up Stopped.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Spawn`](crate::MonitorError::Spawn) if the
    /// worker thread cannot be created; the monitor is left Idle.
    pub fn start(&self, state: TrackedState) -> Result<LifecycleState> {
        let mut slot = self.worker.lock();

        if self.state() == LifecycleState::Running {
            debug!("start ignored, monitor already running");
            return Ok(LifecycleState::Running);
        }
        if let Some(previous) = slot.take() {
            previous.finish(self.shared.config.stop_timeout);
        }
        if let Some(environment) = self.shared.environment.lock().as_mut() {
            environment.debugger_mut().reset();
        }

        let generation = {
            let mut guard = self.shared.core.lock();
            let core = &mut *guard;
            core.store.reset();
            core.lifecycle = LifecycleState::Idle;
            let snapshotted = core.store.create_snapshot(&state);
            self.shared.view.set(state);

            if !snapshotted
                && core.store.policy().snapshot_failure.is_fail_closed()
            {
                let event = self.shared.violate(core, "initial snapshot failed");
                drop(guard);
                self.shared.notify(&event);
                return Ok(LifecycleState::Stopped);
            }

            core.generation += 1;
            core.lifecycle = LifecycleState::Running;
            core.generation
        };

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("warden-monitor".to_string())
            .spawn(move || run_worker(shared, generation, shutdown_rx, done_tx));

        match spawned {
            Ok(handle) => {
                *slot = Some(Worker {
                    handle,
                    shutdown: shutdown_tx,
                    done: done_rx,
                    generation,
                });
                info!(generation, interval_ms = self.shared.config.interval.as_millis() as u64, "monitor started");
                Ok(LifecycleState::Running)
            }
            Err(e) => {
                self.shared.core.lock().lifecycle = LifecycleState::Idle;
                Err(e.into())
            }
        }
    }

    /// Stops the run and waits (bounded) for the worker. No-op while Idle.
    pub fn stop(&self) -> LifecycleState {
        let mut slot = self.worker.lock();
        {
            let mut core = self.shared.core.lock();
            match core.lifecycle {
                LifecycleState::Idle => return LifecycleState::Idle,
                LifecycleState::Running => {
                    core.lifecycle = LifecycleState::Stopped;
                    info!(generation = core.generation, "monitor stopped");
                }
                LifecycleState::Stopped => {}
            }
        }
        if let Some(worker) = slot.take() {
            worker.finish(self.shared.config.stop_timeout);
        }
        LifecycleState::Stopped
    }

    /// Moves Stopped back to Idle, clearing the store. Other states are
    /// left untouched.
    pub fn reset(&self) -> LifecycleState {
        let mut slot = self.worker.lock();
        {
            let mut core = self.shared.core.lock();
            if core.lifecycle != LifecycleState::Stopped {
                return core.lifecycle;
            }
            core.store.reset();
            core.lifecycle = LifecycleState::Idle;
        }
        if let Some(worker) = slot.take() {
            worker.finish(self.shared.config.stop_timeout);
        }
        if let Some(environment) = self.shared.environment.lock().as_mut() {
            environment.debugger_mut().reset();
        }
        LifecycleState::Idle
    }

    /// Replaces the tracked state and re-snapshots it atomically with
    /// respect to validation. Returns whether the snapshot succeeded.
    ///
    /// A failed snapshot under a fail-closed policy stops a running monitor.
    pub fn update_game_state(&self, state: TrackedState) -> bool {
        let violation = {
            let mut guard = self.shared.core.lock();
            let core = &mut *guard;
            let snapshotted = core.store.update_snapshot(&state);
            self.shared.view.set(state);
            if snapshotted {
                return true;
            }
            (core.lifecycle == LifecycleState::Running
                && core.store.policy().snapshot_failure.is_fail_closed())
            .then(|| self.shared.violate(core, "snapshot update failed"))
        };

        if let Some(event) = violation {
            self.wake_worker();
            self.shared.notify(&event);
        }
        false
    }

    /// Validates `state` against the current snapshot without touching the
    /// lifecycle.
    pub fn validate_state(&self, state: &TrackedState) -> bool {
        self.shared.core.lock().store.validate_state(state)
    }

    /// Runs one loop body on the calling thread.
    pub fn check_now(&self) -> CheckOutcome {
        let outcome = self.shared.tick(None);
        if let CheckOutcome::Violation(event) = &outcome {
            self.wake_worker();
            self.shared.notify(event);
        }
        outcome
    }

    /// Registers a raw address for readability and modification checks.
    pub fn watch_address(&self, address: usize) {
        self.shared.core.lock().memory.cache_address(address);
    }

    /// Registers the memory of `value` and returns its address.
    ///
    /// `value` must stay alive and in place while the monitor runs.
    pub fn watch_value<T>(&self, value: &T) -> usize {
        self.shared.core.lock().memory.cache_value(value)
    }

    /// Copy of the host's current state as held by the view.
    #[must_use]
    pub fn tracked_state(&self) -> TrackedState {
        self.shared.view.get()
    }

    /// Handle to the host's live state.
    ///
    /// The host writes its current state here as it changes; every tick
    /// validates the view against the accepted snapshot. Only
    /// [`IntegrityMonitor::update_game_state`] moves the snapshot.
    #[must_use]
    pub fn state_view(&self) -> StateView {
        self.shared.view.clone()
    }

    /// Runs `f` with read access to the snapshot store.
    pub fn with_store<R>(&self, f: impl FnOnce(&SnapshotStore) -> R) -> R {
        f(&self.shared.core.lock().store)
    }

    /// Event sink violations are written to.
    #[must_use]
    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.shared.sink)
    }

    fn wake_worker(&self) {
        if let Some(worker) = self.worker.lock().as_ref() {
            let _ = worker.shutdown.try_send(());
        }
    }
}

impl fmt::Debug for IntegrityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityMonitor")
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for IntegrityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreConfig;
    use serde_json::json;
    use warden_guard::{ProcessMetrics, ProcessProbe};
    use warden_types::MemorySink;

    struct FixedProbe;

    impl ProcessProbe for FixedProbe {
        fn sample_self(&mut self) -> warden_guard::Result<ProcessMetrics> {
            Ok(ProcessMetrics {
                cpu_load: 1.0,
                resident_memory_bytes: 1_000_000,
                thread_count: 2,
            })
        }
    }

    fn monitor(interval: Duration) -> (IntegrityMonitor, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let store = SnapshotStore::new(StoreConfig::new(), sink.clone(), Box::new(FixedProbe));
        let config = MonitorConfig::new().with_interval(interval);
        (IntegrityMonitor::new(config, store, MemoryRegionGuard::new(), sink.clone()), sink)
    }

    fn game(score: i64) -> TrackedState {
        TrackedState::new()
            .with_field("board", json!([[0, 0, 0], [0, 0, 0]]))
            .with_field("score", score)
            .with_field("shapes", json!(["T", "I"]))
    }

    #[test]
    fn test_lifecycle_transitions() {
        let (monitor, _) = monitor(Duration::from_secs(60));
        assert_eq!(monitor.state(), LifecycleState::Idle);
        assert_eq!(monitor.stop(), LifecycleState::Idle);

        assert_eq!(monitor.start(game(0)).unwrap(), LifecycleState::Running);
        assert_eq!(monitor.start(game(0)).unwrap(), LifecycleState::Running);
        assert_eq!(monitor.reset(), LifecycleState::Running);

        assert_eq!(monitor.stop(), LifecycleState::Stopped);
        assert_eq!(monitor.reset(), LifecycleState::Idle);
    }

    #[test]
    fn test_check_now_clean_and_inactive() {
        let (monitor, sink) = monitor(Duration::from_secs(60));
        assert_eq!(monitor.check_now(), CheckOutcome::Inactive);
        monitor.start(game(10)).unwrap();
        assert_eq!(monitor.check_now(), CheckOutcome::Clean);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_violation_stops_and_notifies() {
        let (monitor, sink) = monitor(Duration::from_secs(60));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_callback = Arc::clone(&seen);
        monitor.on_violation(move |event| seen_by_callback.lock().push(event.message().to_string()));

        monitor.start(game(0)).unwrap();
        // The host's state changes without a snapshot update.
        monitor.state_view().set(game(5000));

        let outcome = monitor.check_now();
        assert!(outcome.is_violation());
        assert_eq!(monitor.state(), LifecycleState::Stopped);
        assert_eq!(seen.lock().len(), 1);
        // Store detection first, then the monitor's response.
        assert_eq!(sink.count_kind(ViolationKind::IntegrityViolation), 2);
    }

    #[test]
    fn test_update_game_state_moves_baseline() {
        let (monitor, _) = monitor(Duration::from_secs(60));
        monitor.start(game(0)).unwrap();
        assert!(monitor.update_game_state(game(900)));
        assert_eq!(monitor.check_now(), CheckOutcome::Clean);
        assert_eq!(monitor.tracked_state().get("score"), Some(&json!(900)));
        assert_eq!(monitor.state_view().get(), game(900));
    }

    #[test]
    fn test_view_edit_without_update_is_caught() {
        let (monitor, sink) = monitor(Duration::from_secs(60));
        monitor.start(game(0)).unwrap();
        let view = monitor.state_view();

        view.update(|state| state.insert("shapes", json!(["I", "I"])));
        assert!(monitor.check_now().is_violation());
        assert_eq!(monitor.state(), LifecycleState::Stopped);
        assert!(sink
            .events()
            .iter()
            .any(|e| e.message().starts_with("Suspicious field change detected: ")));
    }

    #[test]
    fn test_start_replaces_view_content() {
        let (monitor, _) = monitor(Duration::from_secs(60));
        let view = monitor.state_view();
        view.set(game(123));
        monitor.start(game(0)).unwrap();
        assert_eq!(view.get(), game(0));
        assert_eq!(monitor.check_now(), CheckOutcome::Clean);
    }
}
