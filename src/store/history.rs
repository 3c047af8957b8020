use std::collections::VecDeque;
use std::sync::Arc;

use crate::model::Project;

pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Linear undo/redo stack of project snapshots.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<Arc<Project>>,
    cursor: Option<usize>,
    max_size: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl History {
    pub fn new(max_size: usize) -> Self {
        Self { entries: VecDeque::new(), cursor: None, max_size: max_size.max(1) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current(&self) -> Option<&Arc<Project>> {
        self.cursor.and_then(|idx| self.entries.get(idx))
    }

    /// Pushes `project` after the cursor, dropping any redo entries, then evicts the oldest
    /// entries past capacity. Returns how many entries were evicted.
    pub fn push(&mut self, project: Arc<Project>) -> usize {
        let keep = self.cursor.map_or(0, |idx| idx + 1);
        self.entries.truncate(keep);
        self.entries.push_back(project);
        let mut evicted = 0;
        while self.entries.len() > self.max_size {
            self.entries.pop_front();
            evicted += 1;
        }
        self.cursor = Some(self.entries.len() - 1);
        evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(idx) if idx > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(idx) if idx + 1 < self.entries.len())
    }

    /// Moves the cursor back one entry and returns the snapshot it left.
    pub fn step_back(&mut self) -> Option<Arc<Project>> {
        if !self.can_undo() {
            return None;
        }
        let left = self.current().cloned();
        self.cursor = self.cursor.map(|idx| idx - 1);
        left
    }

    /// Moves the cursor forward one entry and returns the snapshot it left.
    pub fn step_forward(&mut self) -> Option<Arc<Project>> {
        if !self.can_redo() {
            return None;
        }
        let left = self.current().cloned();
        self.cursor = self.cursor.map(|idx| idx + 1);
        left
    }
}
