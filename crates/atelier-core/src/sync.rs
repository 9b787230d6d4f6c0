//! Bridge between the local element store and a realtime room.
//!
//! Outbound, every local mutation pushes the whole element array into the
//! room storage. Inbound, room notifications are queued and folded into the
//! store when the owner drains them, so no callback ever reaches into the
//! store while it is borrowed.

use crate::elements::{Element, ElementId};
use crate::room::{
    ConnectionId, PresencePatch, RoomError, RoomHandle, SharedStorage, StorageChange,
};
use crate::store::ElementStore;
use kurbo::Point;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use thiserror::Error;

/// Sync errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Push to room failed: {0}")]
    PushFailed(#[from] RoomError),
}

/// What a single fold changed in the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldOutcome {
    /// The element array was replaced.
    pub elements_replaced: bool,
    /// A remote selection was adopted.
    pub selection_adopted: bool,
}

/// Keeps one session's store and one room in step.
pub struct SyncBridge {
    /// The joined room.
    room: Box<dyn RoomHandle>,
    /// Changes received from other participants, oldest first.
    inbox: Rc<RefCell<VecDeque<StorageChange>>>,
    /// Last selection value seen in room storage.
    last_remote_selection: Option<ElementId>,
    /// Highest storage version pushed or folded. Older changes are stale.
    last_version: u64,
    /// Most recent push failure, cleared by the next successful push.
    last_error: Option<SyncError>,
}

impl SyncBridge {
    /// Wrap a joined room and start queueing its notifications.
    pub fn new(room: Box<dyn RoomHandle>) -> Self {
        let inbox = Rc::new(RefCell::new(VecDeque::new()));
        let sink = inbox.clone();
        room.on_storage_change(Box::new(move |change: &StorageChange| {
            sink.borrow_mut().push_back(change.clone());
        }));
        Self {
            room,
            inbox,
            last_remote_selection: None,
            last_version: 0,
            last_error: None,
        }
    }

    /// Get the joined room.
    pub fn room(&self) -> &dyn RoomHandle {
        self.room.as_ref()
    }

    /// Get this client's connection id.
    pub fn connection_id(&self) -> ConnectionId {
        self.room.connection_id()
    }

    /// Get the most recent push failure, if the last push failed.
    pub fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }

    /// Replace the store contents with the current room storage.
    /// Used once after joining.
    pub fn load_initial(&mut self, store: &mut ElementStore) -> Result<(), SyncError> {
        let storage = self.room.storage()?;
        log::debug!(
            "Loaded {} elements from room {}",
            storage.elements.len(),
            self.room.room_id()
        );
        store.replace_elements(storage.elements);
        self.last_remote_selection = storage.selected_element;
        self.last_version = storage.version;
        Ok(())
    }

    // --- Outbound ---

    /// Overwrite the room's element array with the local one.
    ///
    /// Failures are logged and remembered but not retried; the next
    /// successful push carries the latest local state forward.
    pub fn push_elements(&mut self, elements: &[Element]) -> Result<(), SyncError> {
        let snapshot = elements.to_vec();
        let result = self.room.mutate_storage(Box::new(move |storage: &mut SharedStorage| {
            storage.elements = snapshot;
        }));
        self.record(result, "elements")
    }

    /// Mirror the local selection into room storage and presence.
    pub fn push_selection(&mut self, selected: Option<ElementId>) -> Result<(), SyncError> {
        let result = self.room.mutate_storage(Box::new(move |storage: &mut SharedStorage| {
            storage.selected_element = selected;
        }));
        if result.is_ok() {
            self.last_remote_selection = selected;
            if let Err(e) = self.room.update_presence(PresencePatch {
                selected_element: Some(selected),
                ..Default::default()
            }) {
                log::debug!("Presence selection update failed: {}", e);
            }
        }
        self.record(result, "selection")
    }

    /// Publish the local cursor position to presence.
    pub fn push_cursor(&mut self, cursor: Option<Point>) -> Result<(), SyncError> {
        self.room
            .update_presence(PresencePatch {
                cursor: Some(cursor),
                ..Default::default()
            })
            .map_err(SyncError::from)
    }

    /// Get the highest storage version this bridge has pushed or folded.
    pub fn last_version(&self) -> u64 {
        self.last_version
    }

    fn record(&mut self, result: Result<u64, RoomError>, what: &str) -> Result<(), SyncError> {
        match result {
            Ok(version) => {
                self.last_version = self.last_version.max(version);
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "Failed to push {} to room {}: {}",
                    what,
                    self.room.room_id(),
                    e
                );
                let error = SyncError::PushFailed(e);
                self.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    // --- Inbound ---

    /// Take every queued remote change, oldest first.
    pub fn take_changes(&mut self) -> Vec<StorageChange> {
        self.inbox.borrow_mut().drain(..).collect()
    }

    /// Number of queued remote changes.
    pub fn pending(&self) -> usize {
        self.inbox.borrow().len()
    }

    /// Fold one remote change into the store.
    ///
    /// The element array is replaced wholesale when it differs from the
    /// local one. A changed remote selection is adopted only if the element
    /// exists locally; a cleared remote selection never clears the local one.
    /// Changes no newer than the last version pushed or folded are skipped,
    /// since the room has already moved past them. History is not touched.
    pub fn fold(&mut self, store: &mut ElementStore, change: &StorageChange) -> FoldOutcome {
        let mut outcome = FoldOutcome::default();
        if change.storage.version <= self.last_version {
            log::debug!(
                "Skipping stale change v{} from {} (at v{})",
                change.storage.version,
                change.origin,
                self.last_version
            );
            return outcome;
        }
        self.last_version = change.storage.version;

        if store.elements() != change.storage.elements.as_slice() {
            log::debug!(
                "Folding {} remote elements from {}",
                change.storage.elements.len(),
                change.origin
            );
            store.replace_elements(change.storage.elements.clone());
            outcome.elements_replaced = true;
        }

        let remote_selection = change.storage.selected_element;
        if remote_selection != self.last_remote_selection {
            self.last_remote_selection = remote_selection;
            if let Some(id) = remote_selection {
                if store.contains(id) && store.selected() != Some(id) {
                    store.set_selected_element(Some(id));
                    outcome.selection_adopted = true;
                }
            }
        }

        outcome
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        self.room.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::room::{MemoryRoomService, Presence, RoomService};

    fn join(service: &MemoryRoomService, name: &str) -> SyncBridge {
        let room = service
            .join("room", Presence::new(Identity::new(name, name)), SharedStorage::default())
            .unwrap();
        SyncBridge::new(room)
    }

    fn rect(x: f64) -> Element {
        Element::rectangle(Point::new(x, 0.0), 10.0, 10.0)
    }

    #[test]
    fn test_push_reaches_other_inbox() {
        let service = MemoryRoomService::new();
        let mut a = join(&service, "a");
        let mut b = join(&service, "b");

        a.push_elements(&[rect(0.0)]).unwrap();

        assert_eq!(a.pending(), 0);
        assert_eq!(b.pending(), 1);
        let changes = b.take_changes();
        assert_eq!(changes[0].origin, a.connection_id());
        assert_eq!(b.pending(), 0);
    }

    #[test]
    fn test_fold_replaces_when_different() {
        let service = MemoryRoomService::new();
        let mut a = join(&service, "a");
        let mut b = join(&service, "b");

        let mut store = ElementStore::new();
        let first = rect(0.0);
        let second = rect(20.0);
        store.add_element(first.clone()).unwrap();

        a.push_elements(&[first.clone(), second.clone()]).unwrap();
        let changes = b.take_changes();
        let outcome = b.fold(&mut store, &changes[0]);

        assert!(outcome.elements_replaced);
        assert_eq!(store.elements(), &[first, second]);
    }

    #[test]
    fn test_fold_identical_is_noop() {
        let service = MemoryRoomService::new();
        let mut a = join(&service, "a");
        let mut b = join(&service, "b");

        let mut store = ElementStore::new();
        let only = rect(0.0);
        store.add_element(only.clone()).unwrap();

        a.push_elements(&[only]).unwrap();
        let changes = b.take_changes();
        assert!(!b.fold(&mut store, &changes[0]).elements_replaced);
    }

    #[test]
    fn test_remote_selection_adopted_only_if_known() {
        let service = MemoryRoomService::new();
        let mut a = join(&service, "a");
        let mut b = join(&service, "b");

        let mut store = ElementStore::new();
        let known = rect(0.0);
        store.add_element(known.clone()).unwrap();
        store.set_selected_element(None);

        a.push_selection(Some(uuid::Uuid::new_v4())).unwrap();
        let changes = b.take_changes();
        assert!(!b.fold(&mut store, &changes[0]).selection_adopted);
        assert_eq!(store.selected(), None);

        a.push_selection(Some(known.id)).unwrap();
        let changes = b.take_changes();
        assert!(b.fold(&mut store, &changes[0]).selection_adopted);
        assert_eq!(store.selected(), Some(known.id));

        a.push_selection(None).unwrap();
        let changes = b.take_changes();
        b.fold(&mut store, &changes[0]);
        assert_eq!(store.selected(), Some(known.id));
    }

    #[test]
    fn test_stale_change_is_skipped() {
        let service = MemoryRoomService::new();
        let mut a = join(&service, "a");
        let mut b = join(&service, "b");

        let mut store = ElementStore::new();
        a.push_elements(&[rect(0.0)]).unwrap();

        // b overwrites the room before folding a's earlier push
        let mine = rect(50.0);
        store.add_element(mine.clone()).unwrap();
        b.push_elements(&[mine.clone()]).unwrap();
        assert_eq!(b.last_version(), 2);

        let changes = b.take_changes();
        assert_eq!(changes[0].storage.version, 1);
        assert_eq!(b.fold(&mut store, &changes[0]), FoldOutcome::default());
        assert_eq!(store.elements(), &[mine.clone()]);
        assert_eq!(service.storage("room").unwrap().elements, vec![mine.clone()]);

        // a folds b's newer write
        let mut other = ElementStore::new();
        let changes = a.take_changes();
        assert!(a.fold(&mut other, &changes[0]).elements_replaced);
        assert_eq!(other.elements(), &[mine]);
        assert_eq!(a.last_version(), 2);
    }

    #[test]
    fn test_push_failure_is_recorded() {
        let service = MemoryRoomService::new();
        let mut a = join(&service, "a");
        service.set_offline("room", a.connection_id(), true);

        let result = a.push_elements(&[rect(0.0)]);
        assert_eq!(result, Err(SyncError::PushFailed(RoomError::Offline)));
        assert!(a.last_error().is_some());

        service.set_offline("room", a.connection_id(), false);
        a.push_elements(&[rect(0.0)]).unwrap();
        assert!(a.last_error().is_none());
        assert_eq!(service.storage("room").unwrap().elements.len(), 1);
    }

    #[test]
    fn test_drop_leaves_room() {
        let service = MemoryRoomService::new();
        let a = join(&service, "a");
        assert_eq!(service.peer_count("room"), 1);
        drop(a);
        assert_eq!(service.peer_count("room"), 0);
    }
}
