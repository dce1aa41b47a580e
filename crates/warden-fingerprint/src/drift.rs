//! # Field Drift Detection
//!
//! Content-hash replacement for pointer-identity tracking. Each field of a
//! [`TrackedState`] is hashed on its own (SHA-256 over canonical JSON), and
//! two digest sets are compared field by field.
//!
//! ## Drift Categories
//!
//! | Level | Cause | Response |
//! |-------|-------|----------|
//! | None | All digests equal | Accept |
//! | Benign | A mutable field changed (board, score) | Log only |
//! | Critical | A frozen field changed, or a field appeared/disappeared | Violation |
//!
//! The host's key set is expected to be stable, so additions and removals
//! are always critical regardless of the frozen list.

use crate::canonicalize::canonicalize;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use warden_types::TrackedState;

/// SHA-256 of one field's canonical JSON.
pub type FieldDigest = [u8; 32];

/// Digest per field name, sorted by name.
pub type FieldDigests = BTreeMap<String, FieldDigest>;

/// Hashes a single JSON value.
#[must_use]
pub fn digest_value(value: &Value) -> FieldDigest {
    Sha256::digest(canonicalize(value).as_bytes()).into()
}

/// Hashes every field of `state`.
#[must_use]
pub fn digest_fields(state: &TrackedState) -> FieldDigests {
    state
        .iter()
        .map(|(name, value)| (name.to_string(), digest_value(value)))
        .collect()
}

/// Overall drift severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DriftLevel {
    /// No field changed.
    None,
    /// Only mutable fields changed.
    Benign,
    /// A frozen field changed or the key set changed.
    Critical,
}

/// How a field differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Present now, absent in the baseline.
    Added,
    /// Present in the baseline, absent now.
    Removed,
    /// Present in both with different content.
    Modified,
}

/// One differing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Field name.
    pub field: String,
    /// Kind of difference.
    pub kind: ChangeKind,
    /// Whether the field is on the frozen list.
    pub frozen: bool,
}

impl FieldChange {
    /// Severity contributed by this change alone.
    #[must_use]
    pub const fn level(&self) -> DriftLevel {
        match self.kind {
            ChangeKind::Added | ChangeKind::Removed => DriftLevel::Critical,
            ChangeKind::Modified if self.frozen => DriftLevel::Critical,
            ChangeKind::Modified => DriftLevel::Benign,
        }
    }
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ChangeKind::Added => "appeared",
            ChangeKind::Removed => "disappeared",
            ChangeKind::Modified if self.frozen => "frozen field modified",
            ChangeKind::Modified => "modified",
        };
        write!(f, "'{}' {}", self.field, what)
    }
}

/// Result of comparing two digest sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDrift {
    /// Highest severity among `changes`.
    pub level: DriftLevel,
    /// Every differing field, sorted by name.
    pub changes: Vec<FieldChange>,
}

impl FieldDrift {
    /// Returns true if the drift must be treated as tampering.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.level == DriftLevel::Critical
    }

    /// Changes at critical level only.
    pub fn critical_changes(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes
            .iter()
            .filter(|c| c.level() == DriftLevel::Critical)
    }
}

/// Compares a baseline digest set against the current one.
///
/// # Example
///
/// ```rust
/// use warden_fingerprint::{compare_fields, digest_fields, DriftLevel};
/// use warden_types::TrackedState;
///
/// let before = TrackedState::new().with_field("score", 1).with_field("shapes", "T");
/// let after = TrackedState::new().with_field("score", 2).with_field("shapes", "T");
///
/// let drift = compare_fields(&digest_fields(&before), &digest_fields(&after), &["shapes"]);
/// assert_eq!(drift.level, DriftLevel::Benign);
/// ```
#[must_use]
pub fn compare_fields<S: AsRef<str>>(
    baseline: &FieldDigests,
    current: &FieldDigests,
    frozen: &[S],
) -> FieldDrift {
    let is_frozen = |name: &str| frozen.iter().any(|f| f.as_ref() == name);
    let mut changes = Vec::new();

    for (name, old) in baseline {
        match current.get(name) {
            None => changes.push(FieldChange {
                field: name.clone(),
                kind: ChangeKind::Removed,
                frozen: is_frozen(name),
            }),
            Some(new) if new != old => changes.push(FieldChange {
                field: name.clone(),
                kind: ChangeKind::Modified,
                frozen: is_frozen(name),
            }),
            Some(_) => {}
        }
    }

    for name in current.keys() {
        if !baseline.contains_key(name) {
            changes.push(FieldChange {
                field: name.clone(),
                kind: ChangeKind::Added,
                frozen: is_frozen(name),
            });
        }
    }

    changes.sort_by(|a, b| a.field.cmp(&b.field));
    let level = changes
        .iter()
        .map(FieldChange::level)
        .max()
        .unwrap_or(DriftLevel::None);

    FieldDrift { level, changes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn game(score: u64, shape: &str) -> TrackedState {
        TrackedState::new()
            .with_field("board", json!([[0, 0], [0, 0]]))
            .with_field("score", score)
            .with_field("shapes", json!([shape]))
    }

    #[test]
    fn test_identical_states_have_no_drift() {
        let a = digest_fields(&game(10, "T"));
        let b = digest_fields(&game(10, "T"));
        let drift = compare_fields(&a, &b, &["shapes"]);
        assert_eq!(drift.level, DriftLevel::None);
        assert!(drift.changes.is_empty());
    }

    #[test]
    fn test_mutable_field_change_is_benign() {
        let drift = compare_fields(
            &digest_fields(&game(10, "T")),
            &digest_fields(&game(20, "T")),
            &["shapes"],
        );
        assert_eq!(drift.level, DriftLevel::Benign);
        assert_eq!(drift.changes.len(), 1);
        assert_eq!(drift.changes[0].field, "score");
        assert!(!drift.is_critical());
    }

    #[test]
    fn test_frozen_field_change_is_critical() {
        let drift = compare_fields(
            &digest_fields(&game(10, "T")),
            &digest_fields(&game(10, "I")),
            &["shapes"],
        );
        assert!(drift.is_critical());
        let critical: Vec<_> = drift.critical_changes().collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].to_string(), "'shapes' frozen field modified");
    }

    #[test]
    fn test_key_set_changes_are_critical() {
        let baseline = digest_fields(&game(10, "T"));
        let mut extra = game(10, "T");
        extra.insert("lives", 99);
        let drift = compare_fields(&baseline, &digest_fields(&extra), &[] as &[&str]);
        assert!(drift.is_critical());
        assert_eq!(drift.changes[0].kind, ChangeKind::Added);

        let removed = TrackedState::new().with_field("board", json!([[0, 0], [0, 0]]));
        let drift = compare_fields(&baseline, &digest_fields(&removed), &[] as &[&str]);
        assert_eq!(drift.changes.len(), 2);
        assert!(drift.changes.iter().all(|c| c.kind == ChangeKind::Removed));
    }

    #[test]
    fn test_digest_ignores_key_order() {
        assert_eq!(
            digest_value(&json!({"a": 1, "b": 2})),
            digest_value(&json!({"b": 2, "a": 1}))
        );
    }
}
