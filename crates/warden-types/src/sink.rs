//! Event sinks.
//!
//! Every component that can raise a [`ViolationEvent`] receives an
//! `Arc<dyn EventSink>` when it is constructed. Sinks are append-only and
//! infallible from the caller's point of view: a sink that cannot persist
//! an event swallows the failure.

use crate::event::{ViolationEvent, ViolationKind};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Append-only destination for violation events.
pub trait EventSink: Send + Sync {
    /// Records one event. Must not panic and must not report failure.
    fn record(&self, event: &ViolationEvent);
}

/// Security log file: one human-readable line per event.
///
/// The file is opened in append mode for every write, so external log
/// rotation and deletion are tolerated. Write failures are dropped after a
/// `tracing` warning; they are never retried.
///
/// # Example
///
/// ```rust,no_run
/// use warden_types::{EventSink, SecurityLog, ViolationEvent, ViolationKind};
///
/// let log = SecurityLog::new("security_log.txt");
/// log.record(&ViolationEvent::new(ViolationKind::IntegrityViolation, "too many board changes: 7"));
/// ```
#[derive(Debug)]
pub struct SecurityLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SecurityLog {
    /// Creates a log writing to `path`. The file is created lazily.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for SecurityLog {
    fn record(&self, event: &ViolationEvent) {
        let _guard = self.write_lock.lock();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", event.log_line()));

        if let Err(e) = result {
            warn!(path = %self.path.display(), "security log write dropped: {}", e);
        }
    }
}

/// In-memory event journal.
///
/// Used by hosts that want to inspect the trail programmatically and by
/// tests. Unbounded by default; [`MemorySink::with_capacity`] keeps only
/// the most recent events. Per-kind counts always cover every event ever
/// recorded, including the ones the ring has dropped.
///
/// # Example
///
/// ```rust
/// use warden_types::{EventSink, MemorySink, ViolationEvent, ViolationKind};
///
/// let journal = MemorySink::with_capacity(2);
/// for message in ["a", "b", "c"] {
///     journal.record(&ViolationEvent::new(ViolationKind::ValidationError, message));
/// }
/// assert_eq!(journal.len(), 2);
/// assert_eq!(journal.dropped(), 1);
/// assert_eq!(journal.count_kind(ViolationKind::ValidationError), 3);
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    journal: Mutex<Journal>,
}

#[derive(Debug, Default)]
struct Journal {
    events: VecDeque<ViolationEvent>,
    capacity: Option<usize>,
    counts: HashMap<ViolationKind, usize>,
    dropped: usize,
}

impl MemorySink {
    /// Creates an unbounded journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal retaining at most `capacity` events (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            journal: Mutex::new(Journal {
                events: VecDeque::with_capacity(capacity),
                capacity: Some(capacity),
                ..Journal::default()
            }),
        }
    }

    /// Retention limit, if bounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.journal.lock().capacity
    }

    /// Copy of the retained events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<ViolationEvent> {
        self.journal.lock().events.iter().cloned().collect()
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.journal.lock().events.len()
    }

    /// Returns true if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.journal.lock().events.is_empty()
    }

    /// Number of events of the given kind ever recorded.
    #[must_use]
    pub fn count_kind(&self, kind: ViolationKind) -> usize {
        self.journal.lock().counts.get(&kind).copied().unwrap_or(0)
    }

    /// Number of events pushed out of a bounded journal.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.journal.lock().dropped
    }

    /// Most recent event, if any.
    #[must_use]
    pub fn last(&self) -> Option<ViolationEvent> {
        self.journal.lock().events.back().cloned()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &ViolationEvent) {
        let mut journal = self.journal.lock();
        *journal.counts.entry(event.kind()).or_insert(0) += 1;
        if journal.capacity.is_some_and(|cap| journal.events.len() >= cap) {
            journal.events.pop_front();
            journal.dropped += 1;
        }
        journal.events.push_back(event.clone());
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    /// Creates a fan-out with no targets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a target sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn record(&self, event: &ViolationEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_security_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("security_log.txt");
        let log = SecurityLog::new(&path);

        log.record(&ViolationEvent::new(ViolationKind::SnapshotFailure, "first"));
        log.record(&ViolationEvent::new(ViolationKind::IntegrityViolation, "second"));

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("first"));
        assert!(lines[1].contains("CRITICAL/integrity_violation"));
    }

    #[test]
    fn test_security_log_swallows_write_failures() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let log = SecurityLog::new(dir.path());
        log.record(&ViolationEvent::new(ViolationKind::ValidationError, "dropped"));
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_memory_sink_counts() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.record(&ViolationEvent::new(ViolationKind::IntegrityViolation, "a"));
        sink.record(&ViolationEvent::new(ViolationKind::ValidationError, "b"));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.count_kind(ViolationKind::IntegrityViolation), 1);
        assert_eq!(sink.last().unwrap().message(), "b");
    }

    #[test]
    fn test_bounded_journal_keeps_latest_and_counts_all() {
        let sink = MemorySink::with_capacity(3);
        for i in 0..5 {
            sink.record(&ViolationEvent::new(ViolationKind::IntegrityViolation, format!("event {i}")));
        }
        assert_eq!(sink.capacity(), Some(3));
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.dropped(), 2);
        assert_eq!(sink.count_kind(ViolationKind::IntegrityViolation), 5);
        let messages: Vec<String> = sink.events().iter().map(|e| e.message().to_string()).collect();
        assert_eq!(messages, vec!["event 2", "event 3", "event 4"]);
        assert_eq!(MemorySink::with_capacity(0).capacity(), Some(1));
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new().with_sink(a.clone()).with_sink(b.clone());
        fanout.record(&ViolationEvent::new(ViolationKind::SnapshotFailure, "x"));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
