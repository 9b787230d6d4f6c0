//! Linear undo/redo over serialized snapshots of the element set.
//!
//! Only local, user-initiated mutations are committed. Remote folds never
//! touch the history.

use crate::elements::Element;
use std::collections::VecDeque;
use thiserror::Error;

/// History errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// An opaque serialized copy of the element set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(String);

impl Snapshot {
    /// Serialize the current element set.
    pub fn capture(elements: &[Element]) -> Result<Self, HistoryError> {
        serde_json::to_string(elements)
            .map(Snapshot)
            .map_err(|e| HistoryError::InvalidSnapshot(e.to_string()))
    }

    /// Wrap an already serialized element array.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Snapshot(raw.into())
    }

    /// Decode the element set.
    pub fn restore(&self) -> Result<Vec<Element>, HistoryError> {
        serde_json::from_str(&self.0).map_err(|e| HistoryError::InvalidSnapshot(e.to_string()))
    }
}

/// Past/present/future snapshot stacks.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    /// Oldest first.
    past: Vec<Snapshot>,
    present: Snapshot,
    /// Next redo first.
    future: VecDeque<Snapshot>,
    /// Maximum length of `past`; `None` keeps everything.
    limit: Option<usize>,
}

impl HistoryManager {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            past: Vec::new(),
            present: initial,
            future: VecDeque::new(),
            limit: None,
        }
    }

    pub fn with_limit(initial: Snapshot, limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::new(initial)
        }
    }

    /// Record a new present after a local mutation. Clears redo.
    pub fn commit(&mut self, snapshot: Snapshot) {
        let previous = std::mem::replace(&mut self.present, snapshot);
        self.past.push(previous);
        self.future.clear();

        if let Some(limit) = self.limit {
            if self.past.len() > limit {
                let excess = self.past.len() - limit;
                self.past.drain(..excess);
            }
        }
    }

    /// Step back one snapshot.
    ///
    /// Returns the element set to apply, or `None` if there is nothing to
    /// undo. A snapshot that fails to decode leaves every stack untouched.
    pub fn undo(&mut self) -> Result<Option<Vec<Element>>, HistoryError> {
        let Some(target) = self.past.last() else {
            return Ok(None);
        };
        let elements = target.restore()?;

        if let Some(target) = self.past.pop() {
            let current = std::mem::replace(&mut self.present, target);
            self.future.push_front(current);
        }
        Ok(Some(elements))
    }

    /// Step forward one snapshot. Same contract as [`undo`](Self::undo).
    pub fn redo(&mut self) -> Result<Option<Vec<Element>>, HistoryError> {
        let Some(target) = self.future.front() else {
            return Ok(None);
        };
        let elements = target.restore()?;

        if let Some(target) = self.future.pop_front() {
            let current = std::mem::replace(&mut self.present, target);
            self.past.push(current);
        }
        Ok(Some(elements))
    }

    pub fn present(&self) -> &Snapshot {
        &self.present
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.past.len()
    }

    pub fn redo_count(&self) -> usize {
        self.future.len()
    }
}
