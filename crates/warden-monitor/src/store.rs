//! # Snapshot Store
//!
//! Holds the last accepted [`Snapshot`] and validates the host's current
//! state against it.
//!
//! ## Validation Pipeline
//!
//! ```text
//! validate_state(current)
//!   ├─ rate limit (100 ms)        → cached verdict
//!   ├─ no snapshot yet            → accept
//!   ├─ field drift                → frozen field changed / key set changed
//!   ├─ process metrics            → CPU ± 50 points, RSS ± 10 MB
//!   ├─ suspicious patterns        → score jump > 1000, > 4 board cells
//!   └─ score cadence ledger       → too fast / too regular
//! ```
//!
//! The first failing check stops the pipeline, records an
//! `IntegrityViolation` and yields `false`. A fault inside the pipeline
//! (malformed field, metrics sampling failure) records a `ValidationError` and yields
//! the verdict chosen by the [`PolicyTable`].
//!
//! ## Security Notes
//!
//! - Fingerprints are salted and only logged; no decision compares them
//! - Every event reaches the sink before the verdict is returned
//! - Rapid mutation inside the rate-limit window is invisible by design of
//!   the window; keep it short

use crate::error::{MonitorError, Result};
use crate::ledger::{SuspiciousActivityLedger, SCORE_CHANGES};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};
use warden_fingerprint::{compare_fields, digest_fields, fingerprint, DriftLevel, Fingerprint, FieldDigests};
use warden_guard::{ProcessEnvironmentGuard, ProcessMetrics, ProcessProbe};
use warden_types::{
    Clock, EventSink, FailurePolicy, PolicyTable, SystemClock, TrackedState, ViolationEvent,
    ViolationKind,
};

/// Thresholds and field roles for the snapshot store.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use warden_monitor::StoreConfig;
///
/// let config = StoreConfig::new()
///     .with_rate_limit(Duration::from_millis(250))
///     .with_board_change_threshold(8);
/// assert_eq!(config.score_jump_threshold, 1000);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Minimum time between two full validations.
    pub rate_limit: Duration,
    /// Maximum CPU load difference in percentage points.
    pub cpu_delta_threshold: f32,
    /// Maximum resident memory difference in bytes.
    pub memory_delta_threshold: u64,
    /// Maximum score increase in one step.
    pub score_jump_threshold: i64,
    /// Maximum number of differing board cells in one step.
    pub board_change_threshold: usize,
    /// Trailing window of the score ledger.
    pub ledger_window: Duration,
    /// Events that must be exceeded before cadence is evaluated.
    pub ledger_event_threshold: usize,
    /// Minimum acceptable mean interval between score changes.
    pub min_mean_interval: Duration,
    /// Intervals this close to the mean count as machine-regular.
    pub regularity_tolerance: Duration,
    /// Name of the score field.
    pub score_field: String,
    /// Name of the board field.
    pub board_field: String,
    /// Fields that must never change during a session.
    pub frozen_fields: Vec<String>,
    /// Fail-open / fail-closed decisions.
    pub policy: PolicyTable,
}

impl StoreConfig {
    /// Creates a config with default values.
    ///
    /// Defaults:
    /// - Rate limit: 100 ms
    /// - CPU delta: 50 points, memory delta: 10 MB
    /// - Score jump: 1000, board cells: 4
    /// - Ledger: 60 s window, more than 10 events, 100 ms mean, 10 ms tolerance
    /// - Fields: `score`, `board`, frozen `shapes`
    #[must_use]
    pub fn new() -> Self {
        Self {
            rate_limit: Duration::from_millis(100),
            cpu_delta_threshold: 50.0,
            memory_delta_threshold: 10_000_000,
            score_jump_threshold: 1000,
            board_change_threshold: 4,
            ledger_window: Duration::from_secs(60),
            ledger_event_threshold: 10,
            min_mean_interval: Duration::from_millis(100),
            regularity_tolerance: Duration::from_millis(10),
            score_field: "score".to_string(),
            board_field: "board".to_string(),
            frozen_fields: vec!["shapes".to_string()],
            policy: PolicyTable::new(),
        }
    }

    /// Sets the validation rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Sets the CPU load threshold.
    #[must_use]
    pub fn with_cpu_delta_threshold(mut self, points: f32) -> Self {
        self.cpu_delta_threshold = points;
        self
    }

    /// Sets the resident memory threshold.
    #[must_use]
    pub fn with_memory_delta_threshold(mut self, bytes: u64) -> Self {
        self.memory_delta_threshold = bytes;
        self
    }

    /// Sets the score jump threshold.
    #[must_use]
    pub fn with_score_jump_threshold(mut self, jump: i64) -> Self {
        self.score_jump_threshold = jump;
        self
    }

    /// Sets the board change threshold.
    #[must_use]
    pub fn with_board_change_threshold(mut self, cells: usize) -> Self {
        self.board_change_threshold = cells;
        self
    }

    /// Sets the ledger window.
    #[must_use]
    pub fn with_ledger_window(mut self, window: Duration) -> Self {
        self.ledger_window = window;
        self
    }

    /// Sets the ledger event threshold.
    #[must_use]
    pub fn with_ledger_event_threshold(mut self, events: usize) -> Self {
        self.ledger_event_threshold = events;
        self
    }

    /// Sets the minimum mean interval between score changes.
    #[must_use]
    pub fn with_min_mean_interval(mut self, interval: Duration) -> Self {
        self.min_mean_interval = interval;
        self
    }

    /// Sets the regularity tolerance.
    #[must_use]
    pub fn with_regularity_tolerance(mut self, tolerance: Duration) -> Self {
        self.regularity_tolerance = tolerance;
        self
    }

    /// Replaces the frozen field list.
    #[must_use]
    pub fn with_frozen_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.frozen_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the failure policies.
    #[must_use]
    pub fn with_policy(mut self, policy: PolicyTable) -> Self {
        self.policy = policy;
        self
    }

    fn ledger(&self) -> SuspiciousActivityLedger {
        SuspiciousActivityLedger::new()
            .with_window(self.ledger_window)
            .with_event_threshold(self.ledger_event_threshold)
            .with_min_mean_interval(self.min_mean_interval)
            .with_regularity_tolerance(self.regularity_tolerance)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The accepted baseline. Immutable once stored.
#[derive(Debug, Clone)]
pub struct Snapshot {
    sequence: u64,
    process_id: u32,
    captured_at: Instant,
    captured_wall: DateTime<Utc>,
    state: TrackedState,
    fingerprint: Fingerprint,
    process_metrics: ProcessMetrics,
    field_digests: FieldDigests,
    validation_count: u64,
}

impl Snapshot {
    /// Position of this snapshot in the store's lifetime, starting at 1.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Process that captured the snapshot.
    #[must_use]
    pub const fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Monotonic capture time.
    #[must_use]
    pub const fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Wall-clock capture time.
    #[must_use]
    pub const fn captured_wall(&self) -> DateTime<Utc> {
        self.captured_wall
    }

    /// Copy of the accepted state.
    #[must_use]
    pub const fn state(&self) -> &TrackedState {
        &self.state
    }

    /// Salted fingerprint, for logging.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Process metrics sampled at capture.
    #[must_use]
    pub const fn process_metrics(&self) -> ProcessMetrics {
        self.process_metrics
    }

    /// Per-field content digests.
    #[must_use]
    pub const fn field_digests(&self) -> &FieldDigests {
        &self.field_digests
    }

    /// Store validation counter at capture.
    #[must_use]
    pub const fn validation_count(&self) -> u64 {
        self.validation_count
    }
}

/// Owner of the current snapshot and the validation algorithm.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use warden_monitor::{SnapshotStore, StoreConfig};
/// use warden_types::{MemorySink, TrackedState};
///
/// let sink = Arc::new(MemorySink::new());
/// let mut store = SnapshotStore::live(StoreConfig::new(), sink.clone())?;
///
/// let state = TrackedState::new()
///     .with_field("board", json!([[0, 0], [0, 0]]))
///     .with_field("score", 100)
///     .with_field("shapes", json!([[[1, 1]]]));
/// assert!(store.create_snapshot(&state));
///
/// let cheated = state.clone().with_field("score", 1200);
/// assert!(!store.validate_state(&cheated));
/// # Ok::<(), warden_monitor::MonitorError>(())
/// ```
pub struct SnapshotStore {
    config: StoreConfig,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    probe: Box<dyn ProcessProbe>,
    snapshot: Option<Snapshot>,
    ledger: SuspiciousActivityLedger,
    last_validation: Option<Instant>,
    last_verdict: Option<bool>,
    validation_count: u64,
    sequence: u64,
}

impl SnapshotStore {
    /// Creates a store sampling metrics through `probe`.
    pub fn new(config: StoreConfig, sink: Arc<dyn EventSink>, probe: Box<dyn ProcessProbe>) -> Self {
        let ledger = config.ledger();
        Self {
            config,
            sink,
            clock: Arc::new(SystemClock),
            probe,
            snapshot: None,
            ledger,
            last_validation: None,
            last_verdict: None,
            validation_count: 0,
            sequence: 0,
        }
    }

    /// Creates a store sampling the live process.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Probe`] if the current process cannot be
    /// inspected.
    pub fn live(config: StoreConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let probe = ProcessEnvironmentGuard::new()?;
        Ok(Self::new(config, sink, Box::new(probe)))
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Failure policies in force.
    #[must_use]
    pub const fn policy(&self) -> PolicyTable {
        self.config.policy
    }

    /// Current accepted snapshot, if any.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Number of `validate_state` calls, rate-limited ones included.
    #[must_use]
    pub const fn validation_count(&self) -> u64 {
        self.validation_count
    }

    /// Score cadence ledger.
    #[must_use]
    pub const fn ledger(&self) -> &SuspiciousActivityLedger {
        &self.ledger
    }

    /// Event sink this store writes to.
    #[must_use]
    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.sink)
    }

    /// Builds and stores a new snapshot of `state`.
    ///
    /// Clears the cached verdict and the rate limit. On failure a
    /// `SnapshotFailure` event is recorded, the previous snapshot stays in
    /// place and `false` is returned.
    pub fn create_snapshot(&mut self, state: &TrackedState) -> bool {
        match self.build_snapshot(state) {
            Ok(snapshot) => {
                debug!(
                    sequence = snapshot.sequence,
                    fingerprint = %snapshot.fingerprint,
                    fields = snapshot.state.len(),
                    "snapshot stored"
                );
                self.snapshot = Some(snapshot);
                self.last_validation = None;
                self.last_verdict = None;
                true
            }
            Err(e) => {
                self.raise(ViolationKind::SnapshotFailure, format!("Snapshot creation failed: {e}"));
                false
            }
        }
    }

    /// Replaces the snapshot after a transition the host accepted.
    pub fn update_snapshot(&mut self, state: &TrackedState) -> bool {
        self.create_snapshot(state)
    }

    fn build_snapshot(&mut self, state: &TrackedState) -> Result<Snapshot> {
        let captured_wall = Utc::now();
        let process_id = std::process::id();
        let envelope = json!({
            "timestamp": captured_wall.to_rfc3339(),
            "process_id": process_id,
            "state_data": state,
            "validation_count": self.validation_count,
        });

        let fingerprint = fingerprint(&envelope)?;
        let process_metrics = self.probe.sample_self()?;
        self.sequence += 1;

        Ok(Snapshot {
            sequence: self.sequence,
            process_id,
            captured_at: self.clock.now(),
            captured_wall,
            state: state.clone(),
            fingerprint,
            process_metrics,
            field_digests: digest_fields(state),
            validation_count: self.validation_count,
        })
    }

    /// Validates `current` against the snapshot. Returns true if accepted.
    pub fn validate_state(&mut self, current: &TrackedState) -> bool {
        self.validation_count += 1;
        let now = self.clock.now();

        if let (Some(last), Some(verdict)) = (self.last_validation, self.last_verdict) {
            if now.saturating_duration_since(last) < self.config.rate_limit {
                trace!(verdict, "validation rate-limited");
                return verdict;
            }
        }
        self.last_validation = Some(now);

        let verdict = match self.evaluate(current, now) {
            Ok(None) => true,
            Ok(Some(finding)) => {
                self.raise(ViolationKind::IntegrityViolation, finding);
                false
            }
            Err(e) => {
                self.raise(ViolationKind::ValidationError, format!("Validation error: {e}"));
                match self.config.policy.validation_error {
                    FailurePolicy::FailOpen => true,
                    FailurePolicy::FailClosed => false,
                }
            }
        };
        self.last_verdict = Some(verdict);
        verdict
    }

    /// Runs the checks. `Ok(Some(msg))` is a detection.
    fn evaluate(&mut self, current: &TrackedState, now: Instant) -> Result<Option<String>> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            debug!("no snapshot yet, accepting");
            return Ok(None);
        };
        let config = &self.config;

        let drift = compare_fields(&snapshot.field_digests, &digest_fields(current), &config.frozen_fields);
        if drift.is_critical() {
            let fields: Vec<String> = drift.critical_changes().map(ToString::to_string).collect();
            return Ok(Some(format!("Suspicious field change detected: {}", fields.join(", "))));
        }
        if drift.level == DriftLevel::Benign {
            trace!(changed = drift.changes.len(), "benign field drift");
        }

        let metrics = self.probe.sample_self()?;
        if let Some(finding) = check_process(config, &snapshot.process_metrics, &metrics) {
            return Ok(Some(finding));
        }

        let score_delta = match (current.get(&config.score_field), snapshot.state.get(&config.score_field)) {
            (Some(now_score), Some(old_score)) => Some(
                score_of(now_score, &config.score_field)?
                    .checked_sub(score_of(old_score, &config.score_field)?)
                    .ok_or_else(|| MonitorError::malformed(&config.score_field, "score delta overflows"))?,
            ),
            _ => None,
        };
        if let Some(delta) = score_delta {
            if delta > config.score_jump_threshold {
                return Ok(Some(format!("Suspicious score increase: {delta}")));
            }
        }

        if let (Some(new_board), Some(old_board)) =
            (current.get(&config.board_field), snapshot.state.get(&config.board_field))
        {
            let changes = count_board_changes(old_board, new_board, &config.board_field)?;
            if changes > config.board_change_threshold {
                return Ok(Some(format!("Too many board changes: {changes}")));
            }
        }

        if let Some(delta) = score_delta.filter(|d| *d > 0) {
            self.ledger.record(SCORE_CHANGES, now, delta);
            if let Some(anomaly) = self.ledger.evaluate(SCORE_CHANGES, now) {
                return Ok(Some(format!("Suspicious score change pattern detected: {anomaly}")));
            }
        }

        Ok(None)
    }

    /// Drops the snapshot, the ledger, the cached verdict and the counter.
    pub fn reset(&mut self) {
        self.snapshot = None;
        self.ledger.clear();
        self.last_validation = None;
        self.last_verdict = None;
        self.validation_count = 0;
        info!("snapshot store reset");
    }

    fn raise(&self, kind: ViolationKind, message: String) {
        let event = ViolationEvent::new(kind, message);
        event.trace();
        self.sink.record(&event);
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("config", &self.config)
            .field("snapshot", &self.snapshot.as_ref().map(Snapshot::sequence))
            .field("validation_count", &self.validation_count)
            .field("ledger_entries", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

fn check_process(config: &StoreConfig, before: &ProcessMetrics, after: &ProcessMetrics) -> Option<String> {
    if (after.cpu_load - before.cpu_load).abs() > config.cpu_delta_threshold {
        return Some(format!(
            "Suspicious CPU usage detected: {:.1} -> {:.1}",
            before.cpu_load, after.cpu_load
        ));
    }
    let memory_delta = after.resident_memory_bytes.abs_diff(before.resident_memory_bytes);
    if memory_delta > config.memory_delta_threshold {
        return Some(format!("Suspicious memory change detected: rss changed by {memory_delta} bytes"));
    }
    None
}

/// Integral score value. Floats are accepted only when whole and in range.
fn score_of(value: &Value, field: &str) -> Result<i64> {
    if let Some(score) = value.as_i64() {
        return Ok(score);
    }
    let Some(float) = value.as_f64() else {
        return Err(MonitorError::malformed(field, "not a number"));
    };
    // i64::MIN as f64 is exact (-2^63); 2^63 itself is out of range.
    let in_range = float >= i64::MIN as f64 && float < -(i64::MIN as f64);
    if float.is_finite() && float.fract() == 0.0 && in_range {
        Ok(float as i64)
    } else {
        Err(MonitorError::malformed(field, "not an integral score"))
    }
}

/// Number of differing cells between two boards of identical shape.
fn count_board_changes(old: &Value, new: &Value, field: &str) -> Result<usize> {
    let (Some(old_rows), Some(new_rows)) = (old.as_array(), new.as_array()) else {
        return Err(MonitorError::malformed(field, "not an array of rows"));
    };
    if old_rows.len() != new_rows.len() {
        return Err(MonitorError::malformed(
            field,
            format!("row count changed from {} to {}", old_rows.len(), new_rows.len()),
        ));
    }

    let mut changes = 0;
    for (index, (old_row, new_row)) in old_rows.iter().zip(new_rows).enumerate() {
        let (Some(old_cells), Some(new_cells)) = (old_row.as_array(), new_row.as_array()) else {
            return Err(MonitorError::malformed(field, format!("row {index} is not an array")));
        };
        if old_cells.len() != new_cells.len() {
            return Err(MonitorError::malformed(field, format!("row {index} changed length")));
        }
        changes += old_cells.iter().zip(new_cells).filter(|(a, b)| a != b).count();
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_guard::GuardError;
    use warden_types::{ManualClock, MemorySink};

    struct FixedProbe(ProcessMetrics);

    impl ProcessProbe for FixedProbe {
        fn sample_self(&mut self) -> warden_guard::Result<ProcessMetrics> {
            Ok(self.0)
        }
    }

    struct FailingProbe;

    impl ProcessProbe for FailingProbe {
        fn sample_self(&mut self) -> warden_guard::Result<ProcessMetrics> {
            Err(GuardError::ProcessUnavailable { pid: 1 })
        }
    }

    const METRICS: ProcessMetrics = ProcessMetrics {
        cpu_load: 3.0,
        resident_memory_bytes: 40_000_000,
        thread_count: 2,
    };

    fn store(config: StoreConfig) -> (SnapshotStore, Arc<MemorySink>, ManualClock) {
        let sink = Arc::new(MemorySink::new());
        let clock = ManualClock::new();
        let store = SnapshotStore::new(config, sink.clone(), Box::new(FixedProbe(METRICS)))
            .with_clock(Arc::new(clock.clone()));
        (store, sink, clock)
    }

    fn game(score: i64) -> TrackedState {
        TrackedState::new()
            .with_field("board", json!(vec![vec![0u8; 10]; 20]))
            .with_field("score", score)
            .with_field("shapes", json!([[[1, 1, 1], [0, 1, 0]]]))
    }

    fn with_cells(state: &TrackedState, cells: usize) -> TrackedState {
        let mut board = vec![vec![0u8; 10]; 20];
        for i in 0..cells {
            board[i / 10][i % 10] = 1;
        }
        state.clone().with_field("board", json!(board))
    }

    #[test]
    fn test_no_snapshot_accepts() {
        let (mut store, sink, _) = store(StoreConfig::new());
        assert!(store.validate_state(&game(0)));
        assert!(sink.is_empty());
        assert_eq!(store.validation_count(), 1);
    }

    #[test]
    fn test_snapshot_envelope() {
        let (mut store, _, _) = store(StoreConfig::new());
        assert!(store.create_snapshot(&game(0)));
        assert!(store.update_snapshot(&game(10)));
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.sequence(), 2);
        assert_eq!(snapshot.process_id(), std::process::id());
        assert_eq!(snapshot.process_metrics(), METRICS);
        assert!(snapshot.fingerprint().is_well_formed());
        assert_eq!(snapshot.field_digests().len(), 3);
        assert_eq!(snapshot.state().get("score"), Some(&json!(10)));
    }

    #[test]
    fn test_unchanged_state_passes() {
        let (mut store, sink, _) = store(StoreConfig::new());
        store.create_snapshot(&game(100));
        assert!(store.validate_state(&game(100)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_score_jump_is_violation() {
        let (mut store, sink, _) = store(StoreConfig::new());
        store.create_snapshot(&game(100));
        assert!(!store.validate_state(&game(1200)));
        assert_eq!(sink.count_kind(ViolationKind::IntegrityViolation), 1);
        assert_eq!(sink.last().unwrap().message(), "Suspicious score increase: 1100");
    }

    #[test]
    fn test_extreme_scores_are_a_validation_error() {
        let (mut store, sink, clock) = store(StoreConfig::new());
        store.create_snapshot(&game(i64::MIN + 1));
        assert!(!store.validate_state(&game(i64::MAX)));
        assert_eq!(sink.count_kind(ViolationKind::ValidationError), 1);
        assert!(sink.last().unwrap().message().contains("score delta overflows"));

        // A large negative delta overflows too.
        store.create_snapshot(&game(i64::MAX));
        clock.advance(Duration::from_millis(100));
        assert!(!store.validate_state(&game(i64::MIN)));
        assert_eq!(sink.count_kind(ViolationKind::ValidationError), 2);
    }

    #[test]
    fn test_extreme_scores_fail_open_when_configured() {
        let policy = PolicyTable::new().with_validation_error(FailurePolicy::FailOpen);
        let (mut store, sink, _) = store(StoreConfig::new().with_policy(policy));
        store.create_snapshot(&game(i64::MIN + 1));
        assert!(store.validate_state(&game(i64::MAX)));
        assert_eq!(sink.count_kind(ViolationKind::ValidationError), 1);
    }

    #[test]
    fn test_score_must_be_integral() {
        let (mut store, sink, clock) = store(StoreConfig::new());
        store.create_snapshot(&game(100));
        assert!(!store.validate_state(&game(100).with_field("score", json!(150.5))));
        assert!(sink.last().unwrap().message().contains("not an integral score"));

        clock.advance(Duration::from_millis(100));
        assert!(!store.validate_state(&game(100).with_field("score", json!(1.0e300))));
        assert_eq!(sink.count_kind(ViolationKind::ValidationError), 2);

        clock.advance(Duration::from_millis(100));
        assert!(store.validate_state(&game(100).with_field("score", json!(140.0))));
    }

    #[test]
    fn test_board_threshold_is_exclusive() {
        let (mut store, _, clock) = store(StoreConfig::new());
        let base = game(0);
        store.create_snapshot(&base);
        assert!(store.validate_state(&with_cells(&base, 4)));

        clock.advance(Duration::from_millis(150));
        assert!(!store.validate_state(&with_cells(&base, 5)));
    }

    #[test]
    fn test_frozen_field_change_is_violation() {
        let (mut store, sink, _) = store(StoreConfig::new());
        store.create_snapshot(&game(0));
        let tampered = game(0).with_field("shapes", json!([[[1, 1, 1, 1]]]));
        assert!(!store.validate_state(&tampered));
        assert!(sink.last().unwrap().message().contains("'shapes' frozen field modified"));
    }

    #[test]
    fn test_new_field_is_violation() {
        let (mut store, _, _) = store(StoreConfig::new());
        store.create_snapshot(&game(0));
        assert!(!store.validate_state(&game(0).with_field("lives", 9)));
    }

    #[test]
    fn test_rate_limit_returns_cached_verdict() {
        let (mut store, sink, clock) = store(StoreConfig::new());
        store.create_snapshot(&game(100));
        assert!(!store.validate_state(&game(5000)));

        // Inside the window even a clean state gets the cached verdict.
        clock.advance(Duration::from_millis(50));
        assert!(!store.validate_state(&game(100)));
        assert_eq!(sink.len(), 1);

        // The limited call did not move the window.
        clock.advance(Duration::from_millis(60));
        assert!(store.validate_state(&game(100)));
        assert_eq!(store.validation_count(), 3);
    }

    #[test]
    fn test_snapshot_clears_cached_verdict() {
        let (mut store, _, _) = store(StoreConfig::new());
        store.create_snapshot(&game(100));
        assert!(!store.validate_state(&game(5000)));
        store.update_snapshot(&game(100));
        assert!(store.validate_state(&game(100)));
    }

    #[test]
    fn test_malformed_board_follows_policy() {
        let (mut store, sink, clock) = store(StoreConfig::new());
        store.create_snapshot(&game(0));
        let broken = game(0).with_field("board", json!("not a board"));
        assert!(!store.validate_state(&broken));
        assert_eq!(sink.count_kind(ViolationKind::ValidationError), 1);

        let policy = PolicyTable::new().with_validation_error(FailurePolicy::FailOpen);
        let (mut open, open_sink, _) = store_with(StoreConfig::new().with_policy(policy), clock);
        open.create_snapshot(&game(0));
        assert!(open.validate_state(&broken));
        assert_eq!(open_sink.count_kind(ViolationKind::ValidationError), 1);
    }

    fn store_with(config: StoreConfig, clock: ManualClock) -> (SnapshotStore, Arc<MemorySink>, ManualClock) {
        let sink = Arc::new(MemorySink::new());
        let store = SnapshotStore::new(config, sink.clone(), Box::new(FixedProbe(METRICS)))
            .with_clock(Arc::new(clock.clone()));
        (store, sink, clock)
    }

    #[test]
    fn test_snapshot_failure_is_logged_and_keeps_previous() {
        let sink = Arc::new(MemorySink::new());
        let mut store = SnapshotStore::new(StoreConfig::new(), sink.clone(), Box::new(FailingProbe));
        assert!(!store.create_snapshot(&game(0)));
        assert!(store.snapshot().is_none());
        assert_eq!(sink.count_kind(ViolationKind::SnapshotFailure), 1);
        assert!(sink.last().unwrap().message().starts_with("Snapshot creation failed"));
    }

    #[test]
    fn test_process_metric_drift() {
        let config = StoreConfig::new();
        let grown = ProcessMetrics {
            resident_memory_bytes: METRICS.resident_memory_bytes + 10_000_001,
            ..METRICS
        };
        assert!(check_process(&config, &METRICS, &grown).unwrap().contains("memory"));

        let busy = ProcessMetrics { cpu_load: 60.0, ..METRICS };
        assert!(check_process(&config, &METRICS, &busy).unwrap().contains("CPU"));

        let slightly = ProcessMetrics {
            cpu_load: 40.0,
            resident_memory_bytes: METRICS.resident_memory_bytes + 9_999_999,
            ..METRICS
        };
        assert_eq!(check_process(&config, &METRICS, &slightly), None);
    }

    #[test]
    fn test_metronomic_score_changes_are_flagged() {
        let (mut store, sink, clock) = store(StoreConfig::new());
        store.create_snapshot(&game(0));

        // Same +10 against the same baseline, exactly every 150 ms.
        let mut verdicts = Vec::new();
        for _ in 0..11 {
            clock.advance(Duration::from_millis(150));
            verdicts.push(store.validate_state(&game(10)));
        }
        assert!(verdicts[..10].iter().all(|v| *v));
        assert!(!verdicts[10]);
        assert!(sink.last().unwrap().message().contains("fixed 150ms cadence"));
    }

    #[test]
    fn test_reset_forgets_everything() {
        let (mut store, _, clock) = store(StoreConfig::new());
        store.create_snapshot(&game(0));
        clock.advance(Duration::from_millis(200));
        store.validate_state(&game(10));
        assert_eq!(store.ledger().len(), 1);

        store.reset();
        assert!(store.snapshot().is_none());
        assert!(store.ledger().is_empty());
        assert_eq!(store.validation_count(), 0);
    }
}
