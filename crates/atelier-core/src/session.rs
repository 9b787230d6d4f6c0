//! One user's editing session on one room.
//!
//! A [`Session`] owns the element store, the history and the sync bridge,
//! and applies the mutation protocol in one place: change the store, commit
//! a snapshot, push to the room, notify subscribers. Remote changes arrive
//! through [`Session::pump`] and skip the history.

use crate::config::SessionConfig;
use crate::connections::{Connection, ConnectionType};
use crate::elements::{Element, ElementId, ElementPatch, ElementStyle, PenStroke};
use crate::events::{ChangeOrigin, SessionEvent, SubscriptionId, Subscribers};
use crate::frames::{Frame, FrameId};
use crate::history::{HistoryError, HistoryManager, Snapshot};
use crate::identity::Identity;
use crate::layers::{LayerBus, LayerChannel, LayerFlag, LayerFlags};
use crate::room::{Presence, RoomError, RoomService, SharedStorage};
use crate::storage::{Storage, StorageResult};
use crate::store::{ElementStore, StoreError};
use crate::sync::{SyncBridge, SyncError};
use kurbo::{CubicBez, Point};
use thiserror::Error;

/// Errors that can abort joining a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Room error: {0}")]
    Room(#[from] RoomError),
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("History error: {0}")]
    History(#[from] HistoryError),
}

/// A freehand stroke being drawn.
#[derive(Debug, Clone)]
struct ActiveStroke {
    stroke: PenStroke,
    style: ElementStyle,
}

/// Local state and plumbing for one participant of a room.
pub struct Session {
    config: SessionConfig,
    identity: Identity,
    store: ElementStore,
    history: HistoryManager,
    bridge: SyncBridge,
    layer_channel: LayerChannel,
    /// Layer flags changed since the last save.
    layers_dirty: bool,
    subscribers: Subscribers,
    active_stroke: Option<ActiveStroke>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("room", &self.bridge.room().room_id())
            .field("user", &self.identity.display_name)
            .field("elements", &self.store.len())
            .finish()
    }
}

impl Session {
    /// Join a room and load its current document.
    ///
    /// A new room is seeded with an empty document. Loading does not create
    /// an undo step: the loaded document becomes the history's present.
    pub fn join(
        service: &dyn RoomService,
        room_id: &str,
        identity: Identity,
        layer_bus: &LayerBus,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let room = service.join(
            room_id,
            Presence::new(identity.clone()),
            SharedStorage::default(),
        )?;
        let mut bridge = SyncBridge::new(room);
        let mut store = ElementStore::with_threshold(config.pen_hit_threshold);
        bridge.load_initial(&mut store)?;

        let initial = Snapshot::capture(store.elements())?;
        let history = HistoryManager::with_limit(initial, config.history_limit);

        log::info!(
            "{} joined room {} with {} elements",
            identity.display_name,
            room_id,
            store.len()
        );

        Ok(Self {
            config,
            identity,
            store,
            history,
            bridge,
            layer_channel: layer_bus.connect(),
            layers_dirty: false,
            subscribers: Subscribers::new(),
            active_stroke: None,
        })
    }

    /// Leave the room. Unsaved layer flags are discarded.
    pub fn leave(self) {
        log::info!(
            "{} left room {}",
            self.identity.display_name,
            self.bridge.room().room_id()
        );
        if self.layers_dirty {
            log::debug!("Discarding unsaved layer flags");
        }
        // Dropping the bridge leaves the room.
    }

    // --- Accessors ---

    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    pub fn elements(&self) -> &[Element] {
        self.store.elements()
    }

    pub fn selected(&self) -> Option<ElementId> {
        self.store.selected()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn room_id(&self) -> &str {
        self.bridge.room().room_id()
    }

    /// This session's connection id in the room.
    pub fn connection_id(&self) -> uuid::Uuid {
        self.bridge.connection_id()
    }

    /// This session's id on the layer bus.
    pub fn tab_id(&self) -> uuid::Uuid {
        self.layer_channel.tab_id()
    }

    /// The most recent push failure, if local state is ahead of the room.
    pub fn sync_error(&self) -> Option<&SyncError> {
        self.bridge.last_error()
    }

    /// Presence of the other participants.
    pub fn others(&self) -> Vec<Presence> {
        self.bridge
            .room()
            .others()
            .into_iter()
            .map(|(_, presence)| presence)
            .collect()
    }

    // --- Subscriptions ---

    pub fn subscribe(&mut self, handler: impl FnMut(&SessionEvent) + 'static) -> SubscriptionId {
        self.subscribers.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    // --- Mutation protocol ---

    /// Commit, push and notify after a local element change.
    fn commit_local(&mut self) {
        match Snapshot::capture(self.store.elements()) {
            Ok(snapshot) => self.history.commit(snapshot),
            Err(e) => log::warn!("Could not snapshot elements, change not undoable: {}", e),
        }
        self.push_elements();
        self.subscribers.emit(SessionEvent::ElementsChanged {
            origin: ChangeOrigin::Local,
        });
    }

    fn push_elements(&mut self) {
        if let Err(e) = self.bridge.push_elements(self.store.elements()) {
            self.subscribers.emit(SessionEvent::SyncPushFailed {
                message: e.to_string(),
            });
        }
    }

    fn push_selection(&mut self) {
        if let Err(e) = self.bridge.push_selection(self.store.selected()) {
            self.subscribers.emit(SessionEvent::SyncPushFailed {
                message: e.to_string(),
            });
        }
    }

    fn emit_selection_if_changed(&mut self, before: Option<ElementId>) {
        let selected = self.store.selected();
        if selected != before {
            self.subscribers
                .emit(SessionEvent::SelectionChanged { selected });
        }
    }

    // --- Elements ---

    /// Add an element and select it.
    pub fn add_element(&mut self, element: Element) -> Result<ElementId, StoreError> {
        let before = self.store.selected();
        let id = self.store.add_element(element)?;
        self.commit_local();
        self.push_selection();
        self.emit_selection_if_changed(before);
        Ok(id)
    }

    /// Patch an element. Returns false if nothing changed.
    pub fn update_element(&mut self, id: ElementId, patch: &ElementPatch) -> bool {
        if !self.store.update_element(id, patch) {
            return false;
        }
        self.commit_local();
        true
    }

    /// Delete an element with its connections and frame memberships.
    /// Returns false for unknown or locked elements.
    pub fn delete_element(&mut self, id: ElementId) -> bool {
        let before = self.store.selected();
        let had_connections = self.store.connections().outgoing(id).next().is_some()
            || self.store.connections().iter().any(|c| c.target == id);
        let in_frame = self.store.frames().iter().any(|f| f.contains(id));

        if self.store.delete_element(id).is_none() {
            return false;
        }
        self.commit_local();
        if had_connections {
            self.subscribers.emit(SessionEvent::ConnectionsChanged);
        }
        if in_frame {
            self.subscribers.emit(SessionEvent::FramesChanged);
        }
        if self.store.selected() != before {
            self.push_selection();
            self.emit_selection_if_changed(before);
        }
        true
    }

    /// Remove every unlocked element. Returns false if nothing was removed.
    pub fn clear(&mut self) -> bool {
        let before = self.store.selected();
        let connections_before = self.store.connections().len();
        let members_before: usize = self.store.frames().iter().map(|f| f.element_ids.len()).sum();

        if self.store.clear() == 0 {
            return false;
        }
        self.commit_local();
        if self.store.connections().len() != connections_before {
            self.subscribers.emit(SessionEvent::ConnectionsChanged);
        }
        let members_after: usize = self.store.frames().iter().map(|f| f.element_ids.len()).sum();
        if members_after != members_before {
            self.subscribers.emit(SessionEvent::FramesChanged);
        }
        if self.store.selected() != before {
            self.push_selection();
            self.emit_selection_if_changed(before);
        }
        true
    }

    pub fn bring_to_front(&mut self, id: ElementId) -> bool {
        if !self.store.bring_to_front(id) {
            return false;
        }
        self.commit_local();
        true
    }

    pub fn send_to_back(&mut self, id: ElementId) -> bool {
        if !self.store.send_to_back(id) {
            return false;
        }
        self.commit_local();
        true
    }

    // --- Selection and hit testing ---

    /// Select an element (or nothing). Never fails, not an undo step.
    pub fn set_selected_element(&mut self, id: Option<ElementId>) {
        let before = self.store.selected();
        self.store.set_selected_element(id);
        self.push_selection();
        self.emit_selection_if_changed(before);
    }

    /// Topmost visible element under a canvas point.
    pub fn element_at(&self, point: Point) -> Option<ElementId> {
        self.store.element_at(point)
    }

    /// Select whatever is under the point, or clear the selection.
    pub fn select_at(&mut self, point: Point) -> Option<ElementId> {
        let hit = self.element_at(point);
        self.set_selected_element(hit);
        hit
    }

    /// Publish the local cursor to the other participants.
    pub fn set_cursor(&mut self, cursor: Option<Point>) {
        if let Err(e) = self.bridge.push_cursor(cursor) {
            log::debug!("Cursor update dropped: {}", e);
        }
    }

    // --- Layers ---

    pub fn layers(&self) -> &LayerFlags {
        self.store.layers()
    }

    /// Flip an element's visibility and mirror it to the other tabs.
    /// Returns the new hidden state.
    pub fn toggle_visibility(&mut self, id: ElementId) -> bool {
        let hidden = self.store.toggle_visibility(id);
        self.layer_changed(LayerFlag::Hidden, id, hidden);
        hidden
    }

    /// Flip an element's lock and mirror it to the other tabs.
    /// Returns the new locked state.
    pub fn toggle_lock(&mut self, id: ElementId) -> bool {
        let locked = self.store.toggle_lock(id);
        self.layer_changed(LayerFlag::Locked, id, locked);
        locked
    }

    fn layer_changed(&mut self, flag: LayerFlag, element: ElementId, value: bool) {
        self.layers_dirty = true;
        self.layer_channel.publish(flag, element, value);
        self.subscribers.emit(SessionEvent::LayerChanged {
            element,
            flag,
            value,
        });
    }

    /// Whether layer flags changed since they were last loaded or saved.
    pub fn layers_dirty(&self) -> bool {
        self.layers_dirty
    }

    /// Hydrate layer flags from local storage.
    pub async fn load_layers(&mut self, storage: &dyn Storage) -> StorageResult<()> {
        let flags = LayerFlags::load(
            storage,
            &self.config.hidden_layers_key,
            &self.config.locked_layers_key,
        )
        .await?;
        log::debug!(
            "Loaded {} hidden and {} locked layer flags",
            flags.hidden_map().len(),
            flags.locked_map().len()
        );
        self.store.set_layers(flags);
        self.layers_dirty = false;
        Ok(())
    }

    /// Write layer flags to local storage if they changed. Flags of
    /// elements no longer in the document are left out.
    /// Returns true if anything was written.
    pub async fn save_layers(&mut self, storage: &dyn Storage) -> StorageResult<bool> {
        if !self.layers_dirty {
            return Ok(false);
        }
        let store = &self.store;
        let flags = store.layers().retained(|id| store.contains(id));
        flags
            .save(
                storage,
                &self.config.hidden_layers_key,
                &self.config.locked_layers_key,
            )
            .await?;
        self.layers_dirty = false;
        Ok(true)
    }

    // --- Connections ---

    /// Connect two elements. Self-loops, unknown elements and duplicate
    /// pairs are ignored and return false.
    pub fn add_connection(
        &mut self,
        source: ElementId,
        target: ElementId,
        kind: ConnectionType,
    ) -> bool {
        let added = self.store.add_connection(source, target, kind);
        if added {
            self.subscribers.emit(SessionEvent::ConnectionsChanged);
        }
        added
    }

    pub fn remove_connection(&mut self, source: ElementId, target: ElementId) -> bool {
        let removed = self.store.remove_connection(source, target);
        if removed {
            self.subscribers.emit(SessionEvent::ConnectionsChanged);
        }
        removed
    }

    /// Where a prototype interaction on `source` leads.
    pub fn target_of(&self, source: ElementId, trigger: ConnectionType) -> Option<ElementId> {
        self.store.connections().target_of(source, trigger)
    }

    pub fn connection_path(&self, connection: &Connection) -> Option<CubicBez> {
        self.store.connection_path(connection)
    }

    // --- Frames ---

    pub fn frames(&self) -> &[Frame] {
        self.store.frames()
    }

    pub fn add_frame(&mut self, name: impl Into<String>, element_ids: &[ElementId]) -> FrameId {
        let id = self.store.add_frame(name, element_ids);
        self.subscribers.emit(SessionEvent::FramesChanged);
        id
    }

    pub fn remove_frame(&mut self, id: FrameId) -> bool {
        let removed = self.store.remove_frame(id).is_some();
        if removed {
            self.subscribers.emit(SessionEvent::FramesChanged);
        }
        removed
    }

    pub fn add_to_frame(&mut self, frame: FrameId, element: ElementId) -> bool {
        let added = self.store.add_to_frame(frame, element);
        if added {
            self.subscribers.emit(SessionEvent::FramesChanged);
        }
        added
    }

    pub fn remove_from_frame(&mut self, frame: FrameId, element: ElementId) -> bool {
        let removed = self.store.remove_from_frame(frame, element);
        if removed {
            self.subscribers.emit(SessionEvent::FramesChanged);
        }
        removed
    }

    // --- Pen gesture ---

    /// Start a freehand stroke at `point`. Replaces any unfinished stroke.
    pub fn begin_stroke(&mut self, point: Point, style: ElementStyle) {
        let mut stroke = PenStroke::new(point);
        stroke.push(point);
        self.active_stroke = Some(ActiveStroke { stroke, style });
    }

    /// Append a point to the stroke in progress.
    /// Returns false if no stroke is active.
    pub fn extend_stroke(&mut self, point: Point) -> bool {
        match &mut self.active_stroke {
            Some(active) => {
                active.stroke.push(point);
                true
            }
            None => false,
        }
    }

    /// The stroke in progress, for live preview.
    pub fn active_stroke(&self) -> Option<&PenStroke> {
        self.active_stroke.as_ref().map(|a| &a.stroke)
    }

    /// Abandon the stroke in progress.
    pub fn cancel_stroke(&mut self) {
        self.active_stroke = None;
    }

    /// Finish the stroke in progress and add it as one element.
    ///
    /// Strokes with fewer than two points are discarded.
    pub fn finish_stroke(&mut self) -> Option<ElementId> {
        let active = self.active_stroke.take()?;
        if active.stroke.len() < 2 {
            log::debug!("Discarding pen stroke with {} points", active.stroke.len());
            return None;
        }
        let element = Element::pen(active.stroke).with_style(active.style);
        match self.add_element(element) {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("Could not add pen stroke: {}", e);
                None
            }
        }
    }

    // --- History ---

    /// Undo the last local change. Returns false if there was nothing to
    /// undo. An unreadable snapshot leaves everything untouched.
    pub fn undo(&mut self) -> Result<bool, HistoryError> {
        match self.history.undo() {
            Ok(Some(elements)) => {
                self.apply_history(elements);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                log::warn!("Undo refused: {}", e);
                Err(e)
            }
        }
    }

    /// Redo the last undone change. Same contract as [`undo`](Self::undo).
    pub fn redo(&mut self) -> Result<bool, HistoryError> {
        match self.history.redo() {
            Ok(Some(elements)) => {
                self.apply_history(elements);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                log::warn!("Redo refused: {}", e);
                Err(e)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Restored state goes to the room like any other edit.
    fn apply_history(&mut self, elements: Vec<Element>) {
        let before = self.store.selected();
        let connections_before = self.store.connections().len();
        self.store.replace_elements(elements);
        self.push_elements();
        self.subscribers.emit(SessionEvent::ElementsChanged {
            origin: ChangeOrigin::History,
        });
        if self.store.connections().len() != connections_before {
            self.subscribers.emit(SessionEvent::ConnectionsChanged);
        }
        if self.store.selected() != before {
            self.push_selection();
            self.emit_selection_if_changed(before);
        }
    }

    // --- Inbound ---

    /// Fold everything other tabs and participants sent since the last
    /// call. Returns the number of remote changes that replaced elements.
    pub fn pump(&mut self) -> usize {
        for update in self.layer_channel.drain() {
            if self
                .store
                .set_layer_flag(update.flag, update.element, update.value)
            {
                self.layers_dirty = true;
                self.subscribers.emit(SessionEvent::LayerChanged {
                    element: update.element,
                    flag: update.flag,
                    value: update.value,
                });
            }
        }

        let mut folded = 0;
        for change in self.bridge.take_changes() {
            let before = self.store.selected();
            let connections_before = self.store.connections().len();
            let outcome = self.bridge.fold(&mut self.store, &change);
            if outcome.elements_replaced {
                folded += 1;
                self.subscribers.emit(SessionEvent::ElementsChanged {
                    origin: ChangeOrigin::Remote,
                });
                if self.store.connections().len() != connections_before {
                    self.subscribers.emit(SessionEvent::ConnectionsChanged);
                }
            }
            // A replacement can also drop a selected element that vanished
            if outcome.selection_adopted || outcome.elements_replaced {
                self.emit_selection_if_changed(before);
            }
        }
        folded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::MemoryRoomService;
    use crate::storage::MemoryStorage;
    use crate::test_util::block_on;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn join(service: &MemoryRoomService, bus: &LayerBus, name: &str) -> Session {
        Session::join(
            service,
            "room",
            Identity::new(name, name),
            bus,
            SessionConfig::default(),
        )
        .unwrap()
    }

    fn rect(x: f64, y: f64) -> Element {
        Element::rectangle(Point::new(x, y), 100.0, 100.0)
    }

    fn record(session: &mut Session) -> Rc<RefCell<Vec<SessionEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        session.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        events
    }

    #[test]
    fn test_join_empty_room() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let session = join(&service, &bus, "alice");

        assert!(session.elements().is_empty());
        assert!(!session.can_undo());
        assert_eq!(session.room_id(), "room");
        assert_eq!(service.peer_count("room"), 1);
    }

    #[test]
    fn test_join_loads_existing_without_undo_step() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut alice = join(&service, &bus, "alice");
        alice.add_element(rect(0.0, 0.0)).unwrap();

        let bob = join(&service, &bus, "bob");
        assert_eq!(bob.elements(), alice.elements());
        assert!(!bob.can_undo());
    }

    #[test]
    fn test_add_selects_and_pushes() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut session = join(&service, &bus, "alice");
        let events = record(&mut session);

        let id = session.add_element(rect(0.0, 0.0)).unwrap();

        assert_eq!(session.selected(), Some(id));
        let storage = service.storage("room").unwrap();
        assert_eq!(storage.elements.len(), 1);
        assert_eq!(storage.selected_element, Some(id));
        assert!(events.borrow().contains(&SessionEvent::ElementsChanged {
            origin: ChangeOrigin::Local
        }));
        assert!(events
            .borrow()
            .contains(&SessionEvent::SelectionChanged { selected: Some(id) }));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut session = join(&service, &bus, "alice");
        let element = rect(0.0, 0.0);

        session.add_element(element.clone()).unwrap();
        assert_eq!(
            session.add_element(element.clone()),
            Err(StoreError::DuplicateId(element.id))
        );
        assert_eq!(session.elements().len(), 1);
        assert_eq!(session.history().undo_count(), 1);
    }

    #[test]
    fn test_duplicate_connection_idempotent() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut session = join(&service, &bus, "alice");
        let a = session.add_element(rect(0.0, 0.0)).unwrap();
        let b = session.add_element(rect(200.0, 0.0)).unwrap();

        assert!(session.add_connection(a, b, ConnectionType::Click));
        assert!(!session.add_connection(a, b, ConnectionType::Click));
        assert!(!session.add_connection(a, b, ConnectionType::Hover));
        assert_eq!(session.store().connections().len(), 1);
        assert_eq!(session.target_of(a, ConnectionType::Click), Some(b));
        assert_eq!(session.target_of(a, ConnectionType::Hover), None);
    }

    #[test]
    fn test_self_loop_rejected() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut session = join(&service, &bus, "alice");
        let a = session.add_element(rect(0.0, 0.0)).unwrap();

        assert!(!session.add_connection(a, a, ConnectionType::Click));
        assert!(session.store().connections().is_empty());
    }

    #[test]
    fn test_delete_cascades() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut session = join(&service, &bus, "alice");
        let a = session.add_element(rect(0.0, 0.0)).unwrap();
        let b = session.add_element(rect(200.0, 0.0)).unwrap();
        let c = session.add_element(rect(400.0, 0.0)).unwrap();
        session.add_connection(a, b, ConnectionType::Click);
        session.add_connection(c, a, ConnectionType::Hover);
        session.add_connection(b, c, ConnectionType::Click);
        let frame = session.add_frame("Screen", &[a, b]);
        let events = record(&mut session);

        session.set_selected_element(Some(a));
        assert!(session.delete_element(a));

        let connections = session.store().connections();
        assert_eq!(connections.len(), 1);
        assert!(connections.iter().all(|c| c.source != a && c.target != a));
        assert!(!session.store().frame(frame).unwrap().contains(a));
        assert_eq!(session.selected(), None);
        assert!(events.borrow().contains(&SessionEvent::ConnectionsChanged));
        assert!(events.borrow().contains(&SessionEvent::FramesChanged));
    }

    #[test]
    fn test_undo_redo_roundtrip() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut session = join(&service, &bus, "alice");

        let a = session.add_element(rect(0.0, 0.0)).unwrap();
        session.add_element(rect(200.0, 0.0)).unwrap();
        session.update_element(a, &ElementPatch::default().moved_to(50.0, 50.0));
        session.bring_to_front(a);
        let after = session.elements().to_vec();
        let n = 4;

        for _ in 0..n {
            assert!(session.undo().unwrap());
        }
        assert!(session.elements().is_empty());
        assert!(!session.undo().unwrap());

        for _ in 0..n {
            assert!(session.redo().unwrap());
        }
        assert_eq!(session.elements(), after.as_slice());
        assert!(!session.redo().unwrap());
    }

    #[test]
    fn test_redo_invalidated_by_new_edit() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut session = join(&service, &bus, "alice");

        session.add_element(rect(0.0, 0.0)).unwrap();
        session.undo().unwrap();
        session.add_element(rect(10.0, 10.0)).unwrap();

        assert!(!session.can_redo());
        assert!(!session.redo().unwrap());
    }

    #[test]
    fn test_undo_is_visible_to_collaborators() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut alice = join(&service, &bus, "alice");
        let mut bob = join(&service, &bus, "bob");

        alice.add_element(rect(0.0, 0.0)).unwrap();
        bob.pump();
        assert_eq!(bob.elements().len(), 1);

        alice.undo().unwrap();
        bob.pump();
        assert!(bob.elements().is_empty());
    }

    #[test]
    fn test_topmost_wins() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut session = join(&service, &bus, "alice");
        let bottom = session.add_element(rect(0.0, 0.0)).unwrap();
        let top = session.add_element(rect(50.0, 50.0)).unwrap();

        assert_eq!(session.element_at(Point::new(75.0, 75.0)), Some(top));
        assert_eq!(session.element_at(Point::new(10.0, 10.0)), Some(bottom));

        session.toggle_visibility(top);
        assert_eq!(session.element_at(Point::new(75.0, 75.0)), Some(bottom));
    }

    #[test]
    fn test_remote_fold_without_history() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut alice = join(&service, &bus, "alice");
        let mut bob = join(&service, &bus, "bob");

        let a = rect(0.0, 0.0);
        let b = rect(200.0, 0.0);
        let c = rect(400.0, 0.0);
        alice.add_element(a.clone()).unwrap();
        alice.add_element(b.clone()).unwrap();
        bob.pump();
        assert_eq!(bob.elements(), &[a.clone(), b.clone()]);
        let events = record(&mut bob);

        let mut remote = alice.elements().to_vec();
        remote.push(c.clone());
        alice.store.replace_elements(remote);
        alice.push_elements();

        assert_eq!(bob.pump(), 1);
        assert_eq!(bob.elements(), &[a, b, c]);
        assert!(!bob.can_undo());
        assert!(events.borrow().contains(&SessionEvent::ElementsChanged {
            origin: ChangeOrigin::Remote
        }));
    }

    #[test]
    fn test_remote_selection_is_advisory() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut alice = join(&service, &bus, "alice");
        let mut bob = join(&service, &bus, "bob");

        let a = alice.add_element(rect(0.0, 0.0)).unwrap();
        bob.pump();
        assert_eq!(bob.selected(), Some(a));

        bob.set_selected_element(None);
        assert_eq!(bob.selected(), None);
        bob.pump();
        assert_eq!(bob.selected(), None);
    }

    #[test]
    fn test_locked_element_immutable() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut session = join(&service, &bus, "alice");
        let id = session.add_element(rect(0.0, 0.0)).unwrap();
        let original = session.store().get(id).unwrap().bounds();
        let undo_steps = session.history().undo_count();

        assert!(session.toggle_lock(id));
        assert!(!session.update_element(id, &ElementPatch::default().moved_to(300.0, 300.0)));
        assert!(!session.update_element(id, &ElementPatch::default().resized_to(5.0, 5.0)));
        assert!(!session.delete_element(id));
        assert_eq!(session.store().get(id).unwrap().bounds(), original);
        assert_eq!(session.history().undo_count(), undo_steps);

        // Presentation and inspection still work
        assert!(session.update_element(id, &ElementPatch::default().with_name("Header")));
        session.set_selected_element(Some(id));
        assert_eq!(session.selected(), Some(id));
        assert!(session.toggle_visibility(id));
    }

    #[test]
    fn test_push_failure_reported() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut alice = join(&service, &bus, "alice");
        let events = record(&mut alice);

        service.set_offline("room", alice.connection_id(), true);
        alice.add_element(rect(0.0, 0.0)).unwrap();

        assert_eq!(alice.elements().len(), 1);
        assert!(alice.sync_error().is_some());
        assert!(service.storage("room").unwrap().elements.is_empty());
        assert!(events
            .borrow()
            .iter()
            .any(|e| matches!(e, SessionEvent::SyncPushFailed { .. })));

        // The next successful push carries the local state forward
        service.set_offline("room", alice.connection_id(), false);
        alice.add_element(rect(200.0, 0.0)).unwrap();
        assert!(alice.sync_error().is_none());
        assert_eq!(service.storage("room").unwrap().elements.len(), 2);
    }

    #[test]
    fn test_layers_mirror_across_tabs() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut tab_a = join(&service, &bus, "alice");
        let mut tab_b = join(&service, &bus, "alice");

        let id = tab_a.add_element(rect(0.0, 0.0)).unwrap();
        tab_b.pump();
        tab_a.toggle_visibility(id);
        tab_b.pump();

        assert!(tab_b.layers().is_hidden(id));
        assert!(tab_b.layers_dirty());
        assert!(tab_a.layers().is_hidden(id));

        tab_b.toggle_visibility(id);
        tab_a.pump();
        assert!(!tab_a.layers().is_hidden(id));
        assert_eq!(tab_a.pump(), 0);
    }

    #[test]
    fn test_layers_save_and_load() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let storage = MemoryStorage::new();
        let mut session = join(&service, &bus, "alice");
        let id = session.add_element(rect(0.0, 0.0)).unwrap();

        assert!(!block_on(session.save_layers(&storage)).unwrap());
        session.toggle_lock(id);
        assert!(block_on(session.save_layers(&storage)).unwrap());
        assert!(!session.layers_dirty());

        let mut other = join(&service, &LayerBus::default(), "alice");
        block_on(other.load_layers(&storage)).unwrap();
        assert!(other.layers().is_locked(id));
    }

    #[test]
    fn test_saved_layers_skip_deleted_elements() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let storage = MemoryStorage::new();
        let mut session = join(&service, &bus, "alice");
        let kept = session.add_element(rect(0.0, 0.0)).unwrap();
        let doomed = session.add_element(rect(200.0, 0.0)).unwrap();

        session.toggle_visibility(kept);
        session.toggle_visibility(doomed);
        assert!(session.delete_element(doomed));
        assert!(block_on(session.save_layers(&storage)).unwrap());

        let saved = block_on(LayerFlags::load(&storage, "hiddenLayers", "lockedLayers")).unwrap();
        assert_eq!(saved.hidden_map().len(), 1);
        assert!(saved.is_hidden(kept));
        assert!(!saved.hidden_map().contains_key(&doomed));
    }

    #[test]
    fn test_pen_stroke_gesture() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut session = join(&service, &bus, "alice");

        session.begin_stroke(Point::new(10.0, 10.0), ElementStyle::default());
        assert_eq!(session.finish_stroke(), None);
        assert!(session.elements().is_empty());

        session.begin_stroke(Point::new(10.0, 10.0), ElementStyle::default());
        assert!(session.extend_stroke(Point::new(50.0, 10.0)));
        assert!(session.extend_stroke(Point::new(90.0, 10.0)));
        let id = session.finish_stroke().unwrap();

        assert!(session.active_stroke().is_none());
        assert!(!session.extend_stroke(Point::new(0.0, 0.0)));
        assert_eq!(session.history().undo_count(), 1);
        assert_eq!(session.element_at(Point::new(50.0, 12.0)), Some(id));
        assert_eq!(session.element_at(Point::new(50.0, 40.0)), None);
    }

    #[test]
    fn test_clear_and_reorder() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut session = join(&service, &bus, "alice");
        let a = session.add_element(rect(0.0, 0.0)).unwrap();
        let b = session.add_element(rect(0.0, 0.0)).unwrap();

        assert!(session.send_to_back(b));
        assert_eq!(session.element_at(Point::new(10.0, 10.0)), Some(a));
        assert!(!session.send_to_back(b));

        assert!(session.clear());
        assert!(session.elements().is_empty());
        assert_eq!(session.selected(), None);
        assert!(session.undo().unwrap());
        assert_eq!(session.elements().len(), 2);
    }

    #[test]
    fn test_clear_keeps_locked_elements() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut session = join(&service, &bus, "alice");
        let locked = session.add_element(rect(0.0, 0.0)).unwrap();
        let loose = session.add_element(rect(200.0, 0.0)).unwrap();
        session.add_connection(loose, locked, ConnectionType::Click);
        session.toggle_lock(locked);
        session.set_selected_element(Some(locked));
        let events = record(&mut session);

        assert!(session.clear());
        assert_eq!(session.elements().len(), 1);
        assert!(session.store().contains(locked));
        assert!(!session.store().contains(loose));
        assert_eq!(session.selected(), Some(locked));
        assert!(session.store().connections().is_empty());
        assert!(events.borrow().contains(&SessionEvent::ConnectionsChanged));
        assert_eq!(service.storage("room").unwrap().elements.len(), 1);

        // Nothing unlocked remains, so no new undo step
        let undo_steps = session.history().undo_count();
        assert!(!session.clear());
        assert_eq!(session.history().undo_count(), undo_steps);
    }

    #[test]
    fn test_concurrent_edits_converge() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut alice = join(&service, &bus, "alice");
        let mut bob = join(&service, &bus, "bob");

        // Both edit before either has seen the other
        alice.add_element(rect(0.0, 0.0)).unwrap();
        bob.add_element(rect(50.0, 0.0)).unwrap();

        bob.pump();
        alice.pump();

        let room = service.storage("room").unwrap().elements;
        assert_eq!(alice.elements(), room.as_slice());
        assert_eq!(bob.elements(), room.as_slice());

        // And again in the other order
        bob.add_element(rect(0.0, 200.0)).unwrap();
        alice.add_element(rect(50.0, 200.0)).unwrap();

        alice.pump();
        bob.pump();

        let room = service.storage("room").unwrap().elements;
        assert_eq!(alice.elements(), room.as_slice());
        assert_eq!(bob.elements(), room.as_slice());
    }

    #[test]
    fn test_undo_clears_room_selection() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut alice = join(&service, &bus, "alice");
        let events = record(&mut alice);

        let id = alice.add_element(rect(0.0, 0.0)).unwrap();
        assert_eq!(service.storage("room").unwrap().selected_element, Some(id));

        assert!(alice.undo().unwrap());
        assert_eq!(alice.selected(), None);
        assert_eq!(service.storage("room").unwrap().selected_element, None);
        assert!(events
            .borrow()
            .contains(&SessionEvent::SelectionChanged { selected: None }));
    }

    #[test]
    fn test_remote_selection_emits_event() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut alice = join(&service, &bus, "alice");
        let mut bob = join(&service, &bus, "bob");

        let a = alice.add_element(rect(0.0, 0.0)).unwrap();
        let b = alice.add_element(rect(200.0, 0.0)).unwrap();
        bob.pump();
        assert_eq!(bob.selected(), Some(b));
        let events = record(&mut bob);

        alice.set_selected_element(Some(a));
        assert_eq!(bob.pump(), 0);
        assert_eq!(bob.selected(), Some(a));
        assert_eq!(
            *events.borrow(),
            vec![SessionEvent::SelectionChanged { selected: Some(a) }]
        );
    }

    #[test]
    fn test_presence_visible_to_others() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let mut alice = join(&service, &bus, "alice");
        let bob = join(&service, &bus, "bob");

        alice.set_cursor(Some(Point::new(1.0, 2.0)));
        let others = bob.others();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].user.display_name, "alice");
        assert_eq!(others[0].cursor, Some(Point::new(1.0, 2.0)));
    }

    #[test]
    fn test_leave_removes_peer() {
        let service = MemoryRoomService::new();
        let bus = LayerBus::default();
        let session = join(&service, &bus, "alice");
        session.leave();
        assert_eq!(service.peer_count("room"), 0);
    }
}
