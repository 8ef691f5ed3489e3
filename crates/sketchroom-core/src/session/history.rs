//! Local undo/redo history
//!
//! Full-canvas snapshots, local to this client. Nothing here is ever
//! retransmitted, so undo only changes what this participant sees.

use crate::models::Stroke;

/// Immutable copy of the stroke log at a point in time
pub type HistorySnapshot = Vec<Stroke>;

#[derive(Debug, Default)]
pub struct HistoryStack {
    undo: Vec<HistorySnapshot>,
    redo: Vec<HistorySnapshot>,
}

impl HistoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the state from before a completed local action
    ///
    /// Clears redo: a new action invalidates the undone future.
    pub fn commit(&mut self, prior: HistorySnapshot) {
        self.undo.push(prior);
        self.redo.clear();
    }

    /// Step back, stashing `current` for redo
    ///
    /// Returns the state to restore, or `None` when there is nothing to undo.
    pub fn undo(&mut self, current: &[Stroke]) -> Option<HistorySnapshot> {
        let previous = self.undo.pop()?;
        self.redo.push(current.to_vec());
        Some(previous)
    }

    /// Step forward, stashing `current` for undo
    pub fn redo(&mut self, current: &[Stroke]) -> Option<HistorySnapshot> {
        let next = self.redo.pop()?;
        self.undo.push(current.to_vec());
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Point, Tool};

    fn state(ids: &[&str]) -> HistorySnapshot {
        ids.iter()
            .map(|id| Stroke::with_id(*id, Tool::Pen, "#000", 2.0, Point::new(0.0, 0.0)))
            .collect()
    }

    #[test]
    fn test_undo_redo_restores_identical_state() {
        let mut history = HistoryStack::new();
        let s0 = state(&["a"]);
        let s1 = state(&["a", "b"]);

        history.commit(s0.clone());
        let undone = history.undo(&s1).unwrap();
        assert_eq!(undone, s0);

        let redone = history.redo(&undone).unwrap();
        assert_eq!(redone, s1);
    }

    #[test]
    fn test_undo_empty_is_noop() {
        let mut history = HistoryStack::new();
        assert!(history.undo(&state(&["a"])).is_none());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_new_commit_clears_redo() {
        let mut history = HistoryStack::new();
        history.commit(state(&[]));
        history.undo(&state(&["a"])).unwrap();
        assert!(history.can_redo());

        history.commit(state(&[]));
        assert!(!history.can_redo());
        assert!(history.redo(&state(&["c"])).is_none());
    }

    #[test]
    fn test_depths() {
        let mut history = HistoryStack::new();
        history.commit(state(&[]));
        history.commit(state(&["a"]));
        assert_eq!(history.undo_depth(), 2);

        history.undo(&state(&["a", "b"]));
        assert_eq!(history.undo_depth(), 1);
        assert_eq!(history.redo_depth(), 1);
    }
}
