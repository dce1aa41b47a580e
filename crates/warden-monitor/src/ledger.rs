//! # Suspicious Activity Ledger
//!
//! Time-windowed record of positive state changes, used to spot input that
//! arrives faster or more regularly than a human can produce it.
//!
//! ## Cadence Rules
//!
//! Evaluated over the events of one category inside the trailing window,
//! only once MORE than `event_threshold` events are present:
//!
//! | Anomaly | Condition (defaults) |
//! |---------|----------------------|
//! | Too fast | mean interval < 100 ms |
//! | Too regular | every interval within 10 ms of the mean |
//!
//! Events older than the window are pruned on every record, so memory is
//! bounded by the event rate times the window.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

/// Category used by the snapshot store for score deltas.
pub const SCORE_CHANGES: &str = "score_changes";

/// One recorded observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    /// When the change was observed.
    pub at: Instant,
    /// Size of the change.
    pub magnitude: i64,
}

/// Why a category's cadence was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceAnomaly {
    /// Events arrive faster than the minimum mean interval.
    TooFast {
        /// Events in the window.
        events: usize,
        /// Mean interval between them.
        mean_interval: Duration,
    },
    /// Every interval is within the tolerance of the mean.
    TooRegular {
        /// Events in the window.
        events: usize,
        /// Mean interval between them.
        mean_interval: Duration,
    },
}

impl fmt::Display for CadenceAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFast { events, mean_interval } => write!(
                f,
                "{events} changes with mean interval {}ms",
                mean_interval.as_millis()
            ),
            Self::TooRegular { events, mean_interval } => write!(
                f,
                "{events} changes at a fixed {}ms cadence",
                mean_interval.as_millis()
            ),
        }
    }
}

/// Per-category, time-windowed event record.
///
/// # Example
///
/// ```rust
/// use std::time::{Duration, Instant};
/// use warden_monitor::SuspiciousActivityLedger;
///
/// let mut ledger = SuspiciousActivityLedger::new();
/// let start = Instant::now();
/// for i in 0..11 {
///     ledger.record("score_changes", start + Duration::from_millis(50 * i), 40);
/// }
/// assert!(ledger.evaluate("score_changes", start + Duration::from_millis(500)).is_some());
/// ```
#[derive(Debug, Clone)]
pub struct SuspiciousActivityLedger {
    window: Duration,
    event_threshold: usize,
    min_mean_interval: Duration,
    regularity_tolerance: Duration,
    categories: BTreeMap<String, VecDeque<LedgerEntry>>,
}

impl SuspiciousActivityLedger {
    /// Creates a ledger with a 60 s window, a threshold of 10 events, a
    /// 100 ms minimum mean interval and a 10 ms regularity tolerance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: Duration::from_secs(60),
            event_threshold: 10,
            min_mean_interval: Duration::from_millis(100),
            regularity_tolerance: Duration::from_millis(10),
            categories: BTreeMap::new(),
        }
    }

    /// Sets the trailing window.
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sets how many events must be exceeded before cadence is evaluated.
    #[must_use]
    pub fn with_event_threshold(mut self, threshold: usize) -> Self {
        self.event_threshold = threshold;
        self
    }

    /// Sets the minimum acceptable mean interval.
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

    /// Records an observation and prunes entries that left the window.
    pub fn record(&mut self, category: &str, at: Instant, magnitude: i64) {
        let window = self.window;
        let entries = self.categories.entry(category.to_string()).or_default();
        entries.push_back(LedgerEntry { at, magnitude });
        while entries
            .front()
            .is_some_and(|e| at.saturating_duration_since(e.at) >= window)
        {
            entries.pop_front();
        }
    }

    /// Entries of `category` still inside the window at `now`, oldest first.
    #[must_use]
    pub fn recent(&self, category: &str, now: Instant) -> Vec<LedgerEntry> {
        self.categories
            .get(category)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| now.saturating_duration_since(e.at) < self.window)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Checks the cadence of `category` as seen at `now`.
    #[must_use]
    pub fn evaluate(&self, category: &str, now: Instant) -> Option<CadenceAnomaly> {
        let recent = self.recent(category, now);
        let events = recent.len();
        if events <= self.event_threshold || events < 2 {
            return None;
        }

        let intervals: Vec<Duration> = recent
            .windows(2)
            .map(|pair| pair[1].at.saturating_duration_since(pair[0].at))
            .collect();
        let total: Duration = intervals.iter().sum();
        let mean_interval = total / u32::try_from(intervals.len()).unwrap_or(u32::MAX);

        if mean_interval < self.min_mean_interval {
            return Some(CadenceAnomaly::TooFast { events, mean_interval });
        }

        let regular = intervals
            .iter()
            .all(|interval| distance(*interval, mean_interval) < self.regularity_tolerance);
        regular.then_some(CadenceAnomaly::TooRegular { events, mean_interval })
    }

    /// Total number of stored entries across categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.values().map(VecDeque::len).sum()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.values().all(VecDeque::is_empty)
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.categories.clear();
    }
}

fn distance(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

impl Default for SuspiciousActivityLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(ledger: &mut SuspiciousActivityLedger, start: Instant, offsets_ms: &[u64]) -> Instant {
        for ms in offsets_ms {
            ledger.record(SCORE_CHANGES, start + Duration::from_millis(*ms), 10);
        }
        start + Duration::from_millis(*offsets_ms.last().unwrap_or(&0))
    }

    #[test]
    fn test_eleven_events_at_fifty_ms_are_too_fast() {
        let mut ledger = SuspiciousActivityLedger::new();
        let offsets: Vec<u64> = (0..11).map(|i| i * 50).collect();
        let now = feed(&mut ledger, Instant::now(), &offsets);

        match ledger.evaluate(SCORE_CHANGES, now) {
            Some(CadenceAnomaly::TooFast { events, mean_interval }) => {
                assert_eq!(events, 11);
                assert_eq!(mean_interval, Duration::from_millis(50));
            }
            other => panic!("expected TooFast, got {other:?}"),
        }
    }

    #[test]
    fn test_ten_events_are_never_flagged() {
        let mut ledger = SuspiciousActivityLedger::new();
        let offsets: Vec<u64> = (0..10).map(|i| i * 50).collect();
        let now = feed(&mut ledger, Instant::now(), &offsets);
        assert_eq!(ledger.evaluate(SCORE_CHANGES, now), None);
    }

    #[test]
    fn test_slow_but_metronomic_cadence_is_too_regular() {
        let mut ledger = SuspiciousActivityLedger::new();
        let offsets: Vec<u64> = (0..12).map(|i| i * 500).collect();
        let now = feed(&mut ledger, Instant::now(), &offsets);
        assert!(matches!(
            ledger.evaluate(SCORE_CHANGES, now),
            Some(CadenceAnomaly::TooRegular { events: 12, .. })
        ));
    }

    #[test]
    fn test_human_cadence_passes() {
        let mut ledger = SuspiciousActivityLedger::new();
        let offsets = [0, 400, 1_300, 1_500, 2_900, 3_100, 4_800, 5_000, 5_900, 7_700, 8_000, 9_600];
        let now = feed(&mut ledger, Instant::now(), &offsets);
        assert_eq!(ledger.evaluate(SCORE_CHANGES, now), None);
    }

    #[test]
    fn test_window_prunes_old_events() {
        let mut ledger = SuspiciousActivityLedger::new().with_window(Duration::from_secs(1));
        let start = Instant::now();
        let offsets: Vec<u64> = (0..11).map(|i| i * 50).collect();
        feed(&mut ledger, start, &offsets);
        assert_eq!(ledger.len(), 11);

        // One late event pushes everything else out of the window.
        ledger.record(SCORE_CHANGES, start + Duration::from_secs(5), 10);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.evaluate(SCORE_CHANGES, start + Duration::from_secs(5)), None);
    }

    #[test]
    fn test_categories_are_independent() {
        let mut ledger = SuspiciousActivityLedger::new();
        let offsets: Vec<u64> = (0..11).map(|i| i * 50).collect();
        let now = feed(&mut ledger, Instant::now(), &offsets);
        assert_eq!(ledger.evaluate("line_clears", now), None);
        ledger.clear();
        assert!(ledger.is_empty());
    }
}
