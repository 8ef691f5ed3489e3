//! Shared canvas stroke log
//!
//! Local strokes are appended optimistically; remote DRAW events are
//! appended as-is. A gesture broadcast incrementally by a remote peer
//! therefore shows up as several progressively longer entries with the
//! same id. Renderers draw [`SharedCanvas::latest_per_id`] instead of the
//! raw log.

use std::collections::HashMap;

use crate::models::{Point, Stroke};

/// Ordered stroke log; insertion order is z-order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedCanvas {
    strokes: Vec<Stroke>,
}

impl SharedCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole log (initial sync, undo/redo restore)
    pub fn replace_all(&mut self, strokes: Vec<Stroke>) {
        self.strokes = strokes;
    }

    /// Append a newly begun local stroke
    pub fn append_own(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    /// Append points to a local stroke
    ///
    /// Returns the extended stroke so the caller can retransmit it whole,
    /// or `None` if no stroke with that id exists.
    pub fn extend_own(&mut self, id: &str, points: Vec<Point>) -> Option<&Stroke> {
        let stroke = self.strokes.iter_mut().rev().find(|s| s.id == id)?;
        stroke.extend(points);
        Some(&*stroke)
    }

    /// Append a stroke received from the relay, without coalescing
    pub fn apply_remote(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
    }

    /// The raw log, duplicates included
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Copy of the current log
    pub fn snapshot(&self) -> Vec<Stroke> {
        self.strokes.clone()
    }

    /// Strokes to render: the latest entry for each id, in the order those
    /// latest entries appear in the log
    pub fn latest_per_id(&self) -> Vec<&Stroke> {
        latest_per_id(&self.strokes)
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
}

/// Render filter over any stroke log (used on published snapshots too)
pub fn latest_per_id(strokes: &[Stroke]) -> Vec<&Stroke> {
    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(strokes.len());
    for (index, stroke) in strokes.iter().enumerate() {
        last_index.insert(stroke.id.as_str(), index);
    }

    strokes
        .iter()
        .enumerate()
        .filter(|(index, stroke)| last_index.get(stroke.id.as_str()) == Some(index))
        .map(|(_, stroke)| stroke)
        .collect()
}
