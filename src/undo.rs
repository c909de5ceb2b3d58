use std::collections::VecDeque;

use crate::model::Project;

/// Whole-document checkpoint. Layer vectors are deep-copied; captured frames
/// stay shared through their `Arc`, so a snapshot is cheap even for large
/// screenshots.
#[derive(Clone, Debug)]
pub struct Snapshot {
    state: Project,
}

impl Snapshot {
    pub fn of(project: &Project) -> Self {
        Self {
            state: project.clone(),
        }
    }
}

/// Bounded undo history. Push a snapshot *before* each mutation; when the
/// cap is reached the oldest checkpoint falls off the front.
#[derive(Debug)]
pub struct UndoStack {
    entries: VecDeque<Snapshot>,
    cap: usize,
}

pub const DEFAULT_UNDO_DEPTH: usize = 20;

impl Default for UndoStack {
    fn default() -> Self {
        Self::with_depth(DEFAULT_UNDO_DEPTH)
    }
}

impl UndoStack {
    pub fn with_depth(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(64)),
            cap: cap.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record(&mut self, project: &Project) {
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(Snapshot::of(project));
        tracing::trace!(depth = self.entries.len(), "undo checkpoint recorded");
    }

    /// Restore the most recent checkpoint into `project`. Returns false when
    /// the history is empty, leaving `project` untouched.
    pub fn undo(&mut self, project: &mut Project) -> bool {
        match self.entries.pop_back() {
            Some(snap) => {
                *project = snap.state;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
