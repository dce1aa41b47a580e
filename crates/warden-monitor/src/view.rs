//! Host-side view of the tracked state.
//!
//! The host keeps a [`StateView`] and writes its live state into it. The
//! monitor's background tick validates whatever the view holds against the
//! accepted snapshot, so a change that never went through
//! `update_game_state` is still compared against the baseline.

use parking_lot::RwLock;
use std::sync::Arc;
use warden_types::TrackedState;

/// Shared, cloneable handle to the host's current tracked state.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use warden_monitor::StateView;
/// use warden_types::TrackedState;
///
/// let view = StateView::new(TrackedState::new().with_field("score", 0));
/// let host = view.clone();
///
/// host.update(|state| state.insert("score", 40));
/// assert_eq!(view.get().get("score"), Some(&json!(40)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StateView {
    inner: Arc<RwLock<TrackedState>>,
}

impl StateView {
    /// Creates a view holding `state`.
    #[must_use]
    pub fn new(state: TrackedState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Copy of the current state.
    #[must_use]
    pub fn get(&self) -> TrackedState {
        self.inner.read().clone()
    }

    /// Replaces the current state.
    pub fn set(&self, state: TrackedState) {
        *self.inner.write() = state;
    }

    /// Mutates the current state in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut TrackedState) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Returns true if both handles share the same state.
    #[must_use]
    pub fn same_view(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clones_share_state() {
        let view = StateView::default();
        let other = view.clone();
        other.set(TrackedState::new().with_field("score", 7));

        assert!(view.same_view(&other));
        assert_eq!(view.get().get("score"), Some(&json!(7)));
        assert!(!view.same_view(&StateView::default()));
    }

    #[test]
    fn test_update_returns_closure_result() {
        let view = StateView::new(TrackedState::new().with_field("score", 1));
        let previous = view.update(|state| state.insert("score", 2));
        assert_eq!(previous, Some(json!(1)));
        assert_eq!(view.get().len(), 1);
    }
}
