//! Local element store: elements, selection, layer flags, frames and
//! connections for one session.

use crate::connections::{Connection, ConnectionGraph, ConnectionType, connection_curve};
use crate::elements::{Element, ElementId, ElementPatch};
use crate::frames::{Frame, FrameId};
use crate::layers::{LayerFlag, LayerFlags};
use kurbo::{CubicBez, Point};
use thiserror::Error;
use uuid::Uuid;

/// Default pixel distance within which a pen stroke counts as hit.
pub const DEFAULT_PEN_HIT_THRESHOLD: f64 = 6.0;

/// Errors raised by store operations that cannot be silently ignored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Element id already exists: {0}")]
    DuplicateId(ElementId),
}

/// Find the topmost element under a point.
///
/// Candidates are in insertion order (back to front); the search runs in
/// reverse so the most recently added element wins. Hidden elements are
/// skipped.
pub fn element_at(
    point: Point,
    candidates: &[Element],
    layers: &LayerFlags,
    pen_threshold: f64,
) -> Option<ElementId> {
    candidates
        .iter()
        .rev()
        .filter(|e| !layers.is_hidden(e.id))
        .find(|e| e.hit_test(point, pen_threshold))
        .map(|e| e.id)
}

/// Authoritative local state for the canvas of one session.
///
/// Element order is insertion order, which doubles as z-order.
#[derive(Debug, Clone)]
pub struct ElementStore {
    elements: Vec<Element>,
    selected: Option<ElementId>,
    layers: LayerFlags,
    connections: ConnectionGraph,
    frames: Vec<Frame>,
    pen_hit_threshold: f64,
}

impl Default for ElementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementStore {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_PEN_HIT_THRESHOLD)
    }

    pub fn with_threshold(pen_hit_threshold: f64) -> Self {
        Self {
            elements: Vec::new(),
            selected: None,
            layers: LayerFlags::new(),
            connections: ConnectionGraph::new(),
            frames: Vec::new(),
            pen_hit_threshold,
        }
    }

    // --- Elements ---

    /// Append an element and select it.
    ///
    /// A nil id is replaced with a fresh one. Returns the element's id.
    pub fn add_element(&mut self, mut element: Element) -> Result<ElementId, StoreError> {
        if element.id.is_nil() {
            element.id = Uuid::new_v4();
        }
        if self.contains(element.id) {
            return Err(StoreError::DuplicateId(element.id));
        }
        let id = element.id;
        self.elements.push(element);
        self.selected = Some(id);
        Ok(id)
    }

    /// Merge a patch into an element.
    ///
    /// An unknown id is a silent no-op: remote folds routinely race with
    /// local deletes. Geometry fields are dropped for locked elements.
    /// Returns true if the element changed.
    pub fn update_element(&mut self, id: ElementId, patch: &ElementPatch) -> bool {
        let locked = self.layers.is_locked(id);
        let Some(element) = self.elements.iter_mut().find(|e| e.id == id) else {
            log::debug!("Ignoring update for missing element {}", id);
            return false;
        };
        if locked && patch.touches_geometry() {
            log::debug!("Element {} is locked, dropping geometry changes", id);
            return element.apply(&patch.without_geometry());
        }
        element.apply(patch)
    }

    /// Remove an element and everything that references it: connections
    /// where it is source or target, and frame memberships.
    ///
    /// Unknown and locked ids are no-ops. Returns the removed element.
    pub fn delete_element(&mut self, id: ElementId) -> Option<Element> {
        if self.layers.is_locked(id) {
            log::debug!("Element {} is locked, refusing delete", id);
            return None;
        }
        let index = self.elements.iter().position(|e| e.id == id)?;
        let removed = self.elements.remove(index);

        self.connections.prune(id);
        for frame in &mut self.frames {
            frame.remove(id);
        }
        if self.selected == Some(id) {
            self.selected = None;
        }
        Some(removed)
    }

    /// Remove every unlocked element with its connections and frame
    /// memberships. Locked elements survive, as do frames themselves.
    /// Returns the number of elements removed.
    pub fn clear(&mut self) -> usize {
        let before = self.elements.len();
        let layers = &self.layers;
        self.elements.retain(|e| layers.is_locked(e.id));
        let removed = before - self.elements.len();
        if removed > 0 {
            self.prune_dangling();
        }
        removed
    }

    /// Replace the whole element set (remote folds and history restores).
    ///
    /// Connections and frame memberships that now dangle are pruned, and a
    /// selection pointing at a vanished element is cleared.
    pub fn replace_elements(&mut self, elements: Vec<Element>) {
        self.elements = elements;
        self.prune_dangling();
    }

    fn prune_dangling(&mut self) {
        let ids: std::collections::HashSet<ElementId> =
            self.elements.iter().map(|e| e.id).collect();

        let pruned = self.connections.retain_existing(|id| ids.contains(&id));
        if pruned > 0 {
            log::debug!("Pruned {} dangling connections", pruned);
        }
        for frame in &mut self.frames {
            frame.element_ids.retain(|id| ids.contains(id));
        }
        if let Some(sel) = self.selected {
            if !ids.contains(&sel) {
                self.selected = None;
            }
        }
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.iter().any(|e| e.id == id)
    }

    /// All elements, back to front.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Elements that should be painted: not hidden, and complete.
    pub fn visible_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements
            .iter()
            .filter(|e| !self.layers.is_hidden(e.id) && e.is_renderable())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Bring an element to the front (topmost).
    /// Returns false if it is missing or already in front.
    pub fn bring_to_front(&mut self, id: ElementId) -> bool {
        let Some(pos) = self.elements.iter().position(|e| e.id == id) else {
            return false;
        };
        if pos + 1 == self.elements.len() {
            return false;
        }
        let element = self.elements.remove(pos);
        self.elements.push(element);
        true
    }

    /// Send an element to the back (bottommost).
    /// Returns false if it is missing or already at the back.
    pub fn send_to_back(&mut self, id: ElementId) -> bool {
        let Some(pos) = self.elements.iter().position(|e| e.id == id) else {
            return false;
        };
        if pos == 0 {
            return false;
        }
        let element = self.elements.remove(pos);
        self.elements.insert(0, element);
        true
    }

    // --- Selection ---

    pub fn selected(&self) -> Option<ElementId> {
        self.selected
    }

    pub fn set_selected_element(&mut self, id: Option<ElementId>) {
        self.selected = id;
    }

    // --- Hit testing ---

    /// Topmost visible element under a point.
    pub fn element_at(&self, point: Point) -> Option<ElementId> {
        element_at(point, &self.elements, &self.layers, self.pen_hit_threshold)
    }

    pub fn pen_hit_threshold(&self) -> f64 {
        self.pen_hit_threshold
    }

    // --- Layers ---

    pub fn layers(&self) -> &LayerFlags {
        &self.layers
    }

    pub fn set_layers(&mut self, layers: LayerFlags) {
        self.layers = layers;
    }

    pub fn toggle_visibility(&mut self, id: ElementId) -> bool {
        self.layers.toggle_visibility(id)
    }

    pub fn toggle_lock(&mut self, id: ElementId) -> bool {
        self.layers.toggle_lock(id)
    }

    pub fn set_layer_flag(&mut self, flag: LayerFlag, id: ElementId, value: bool) -> bool {
        self.layers.set(flag, id, value)
    }

    // --- Connections ---

    pub fn connections(&self) -> &ConnectionGraph {
        &self.connections
    }

    /// Connect two existing, distinct elements.
    /// Returns false for self-loops, unknown elements and duplicates.
    pub fn add_connection(
        &mut self,
        source: ElementId,
        target: ElementId,
        kind: ConnectionType,
    ) -> bool {
        if !self.contains(source) || !self.contains(target) {
            return false;
        }
        self.connections.add(source, target, kind)
    }

    pub fn remove_connection(&mut self, source: ElementId, target: ElementId) -> bool {
        self.connections.remove(source, target)
    }

    /// Derived curve for drawing a connection.
    pub fn connection_path(&self, connection: &Connection) -> Option<CubicBez> {
        let source = self.get(connection.source)?;
        let target = self.get(connection.target)?;
        Some(connection_curve(source, target))
    }

    // --- Frames ---

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.iter().find(|f| f.id == id)
    }

    /// Create a frame over existing elements. Unknown ids are skipped.
    pub fn add_frame(&mut self, name: impl Into<String>, element_ids: &[ElementId]) -> FrameId {
        let mut members = Vec::new();
        for &id in element_ids {
            if self.contains(id) && !members.contains(&id) {
                members.push(id);
            }
        }
        let frame = Frame::new(name, members);
        let id = frame.id;
        self.frames.push(frame);
        id
    }

    /// Delete a frame. Member elements are left in place.
    pub fn remove_frame(&mut self, id: FrameId) -> Option<Frame> {
        let index = self.frames.iter().position(|f| f.id == id)?;
        Some(self.frames.remove(index))
    }

    pub fn add_to_frame(&mut self, frame: FrameId, element: ElementId) -> bool {
        if !self.contains(element) {
            return false;
        }
        self.frames
            .iter_mut()
            .find(|f| f.id == frame)
            .map(|f| f.insert(element))
            .unwrap_or(false)
    }

    pub fn remove_from_frame(&mut self, frame: FrameId, element: ElementId) -> bool {
        self.frames
            .iter_mut()
            .find(|f| f.id == frame)
            .map(|f| f.remove(element))
            .unwrap_or(false)
    }
}
