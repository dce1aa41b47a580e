//! Key-press cadence validation.
//!
//! Complements the score ledger at the input layer: presses that arrive
//! closer together than a human can type raise a suspicion counter, normal
//! presses let it decay by one.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use warden_types::{Clock, SystemClock};

/// Rejects bursts of inhumanly fast key presses.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use warden_monitor::InputCadence;
/// use warden_types::ManualClock;
///
/// let clock = ManualClock::new();
/// let mut cadence = InputCadence::new().with_clock(Arc::new(clock.clone()));
///
/// for _ in 0..6 {
///     clock.advance(Duration::from_millis(10));
///     cadence.validate_input();
/// }
/// assert!(!cadence.validate_input());
/// ```
#[derive(Debug)]
pub struct InputCadence {
    presses: VecDeque<Instant>,
    capacity: usize,
    min_interval: Duration,
    suspicious: u32,
    max_suspicious: u32,
    clock: Arc<dyn Clock>,
}

impl InputCadence {
    /// Creates a validator remembering 10 presses, with a 50 ms minimum
    /// interval and rejection at 5 suspicious presses.
    #[must_use]
    pub fn new() -> Self {
        Self {
            presses: VecDeque::with_capacity(10),
            capacity: 10,
            min_interval: Duration::from_millis(50),
            suspicious: 0,
            max_suspicious: 5,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets how many press times are remembered.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets the minimum human interval between presses.
    #[must_use]
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Sets the suspicion level at which input is rejected.
    #[must_use]
    pub fn with_max_suspicious(mut self, max: u32) -> Self {
        self.max_suspicious = max;
        self
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Records a key press now. Returns false once the input looks scripted.
    pub fn validate_input(&mut self) -> bool {
        let now = self.clock.now();

        if let Some(last) = self.presses.back() {
            if now.saturating_duration_since(*last) < self.min_interval {
                self.suspicious += 1;
            } else {
                self.suspicious = self.suspicious.saturating_sub(1);
            }
        }

        if self.presses.len() == self.capacity {
            self.presses.pop_front();
        }
        self.presses.push_back(now);

        if self.suspicious >= self.max_suspicious {
            warn!(suspicious = self.suspicious, "scripted input cadence");
            return false;
        }
        true
    }

    /// Current suspicion level.
    #[must_use]
    pub fn suspicious_count(&self) -> u32 {
        self.suspicious
    }

    /// Number of remembered presses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.presses.len()
    }

    /// Returns true if no press has been recorded since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.presses.is_empty()
    }

    /// Forgets all presses and the suspicion level.
    pub fn reset(&mut self) {
        self.presses.clear();
        self.suspicious = 0;
    }
}

impl Default for InputCadence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::ManualClock;

    fn cadence() -> (InputCadence, ManualClock) {
        let clock = ManualClock::new();
        let cadence = InputCadence::new().with_clock(Arc::new(clock.clone()));
        (cadence, clock)
    }

    #[test]
    fn test_human_typing_is_accepted() {
        let (mut cadence, clock) = cadence();
        for _ in 0..50 {
            clock.advance(Duration::from_millis(120));
            assert!(cadence.validate_input());
        }
        assert_eq!(cadence.suspicious_count(), 0);
        assert_eq!(cadence.len(), 10);
    }

    #[test]
    fn test_fifth_fast_press_is_rejected() {
        let (mut cadence, clock) = cadence();
        assert!(cadence.validate_input());
        for _ in 0..4 {
            clock.advance(Duration::from_millis(20));
            assert!(cadence.validate_input());
        }
        clock.advance(Duration::from_millis(20));
        assert!(!cadence.validate_input());
        assert_eq!(cadence.suspicious_count(), 5);
    }

    #[test]
    fn test_suspicion_decays_with_slow_presses() {
        let (mut cadence, clock) = cadence();
        cadence.validate_input();
        for _ in 0..3 {
            clock.advance(Duration::from_millis(10));
            cadence.validate_input();
        }
        assert_eq!(cadence.suspicious_count(), 3);

        clock.advance(Duration::from_millis(200));
        cadence.validate_input();
        assert_eq!(cadence.suspicious_count(), 2);
    }

    #[test]
    fn test_reset_clears_history() {
        let (mut cadence, clock) = cadence();
        for _ in 0..8 {
            clock.advance(Duration::from_millis(5));
            cadence.validate_input();
        }
        cadence.reset();
        assert!(cadence.is_empty());
        assert_eq!(cadence.suspicious_count(), 0);
        assert!(cadence.validate_input());
    }
}
