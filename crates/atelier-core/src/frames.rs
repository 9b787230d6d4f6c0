//! Named element groupings used as prototype navigation context.

use crate::elements::ElementId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for frames.
pub type FrameId = Uuid;

/// A named, ordered list of member elements. Frames never own elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    pub name: String,
    pub element_ids: Vec<ElementId>,
}

impl Frame {
    pub fn new(name: impl Into<String>, element_ids: Vec<ElementId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            element_ids,
        }
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.element_ids.contains(&id)
    }

    /// Append a member. Returns false if it was already a member.
    pub fn insert(&mut self, id: ElementId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.element_ids.push(id);
        true
    }

    /// Remove a member. Returns true if it was a member.
    pub fn remove(&mut self, id: ElementId) -> bool {
        let before = self.element_ids.len();
        self.element_ids.retain(|&e| e != id);
        self.element_ids.len() != before
    }
}
