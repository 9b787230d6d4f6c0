//! Prototype navigation edges between elements.

use crate::elements::{Element, ElementId};
use kurbo::{CubicBez, Point};
use serde::{Deserialize, Serialize};

/// What triggers a prototype navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Click,
    Hover,
}

/// A directed edge from one element to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub source: ElementId,
    pub target: ElementId,
    #[serde(rename = "type")]
    pub kind: ConnectionType,
}

/// Directed navigation edges, keyed by (source, target).
///
/// The graph does not know which elements exist; the element store checks
/// existence before adding and prunes edges when elements go away.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGraph {
    connections: Vec<Connection>,
}

impl ConnectionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge. Self-loops and already-present (source, target) pairs
    /// are ignored. Returns true if the edge was added.
    pub fn add(&mut self, source: ElementId, target: ElementId, kind: ConnectionType) -> bool {
        if source == target || self.contains(source, target) {
            return false;
        }
        self.connections.push(Connection {
            source,
            target,
            kind,
        });
        true
    }

    /// Remove the edge with exactly this (source, target).
    /// Returns true if an edge was removed.
    pub fn remove(&mut self, source: ElementId, target: ElementId) -> bool {
        let before = self.connections.len();
        self.connections
            .retain(|c| !(c.source == source && c.target == target));
        self.connections.len() != before
    }

    pub fn contains(&self, source: ElementId, target: ElementId) -> bool {
        self.connections
            .iter()
            .any(|c| c.source == source && c.target == target)
    }

    /// Drop every edge touching `id`. Returns the number removed.
    pub fn prune(&mut self, id: ElementId) -> usize {
        let before = self.connections.len();
        self.connections
            .retain(|c| c.source != id && c.target != id);
        before - self.connections.len()
    }

    /// Keep only edges whose endpoints both satisfy `exists`.
    pub fn retain_existing(&mut self, exists: impl Fn(ElementId) -> bool) -> usize {
        let before = self.connections.len();
        self.connections
            .retain(|c| exists(c.source) && exists(c.target));
        before - self.connections.len()
    }

    /// Where a trigger on `source` navigates to in prototype mode.
    pub fn target_of(&self, source: ElementId, trigger: ConnectionType) -> Option<ElementId> {
        self.connections
            .iter()
            .find(|c| c.source == source && c.kind == trigger)
            .map(|c| c.target)
    }

    pub fn outgoing(&self, source: ElementId) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.source == source)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Curve drawn between the centers of two connected elements.
///
/// Control points are pulled horizontally so edges read left to right.
pub fn connection_curve(source: &Element, target: &Element) -> CubicBez {
    let start = source.center();
    let end = target.center();
    let pull = ((end.x - start.x).abs() / 2.0).max(40.0);
    CubicBez::new(
        start,
        Point::new(start.x + pull, start.y),
        Point::new(end.x - pull, end.y),
        end,
    )
}
