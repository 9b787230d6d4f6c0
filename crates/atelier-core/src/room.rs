//! Realtime room contract and an in-process implementation.
//!
//! A room offers presence broadcast, one shared mutable storage value and
//! change notifications. The sync bridge is written only against
//! [`RoomService`] and [`RoomHandle`]; [`MemoryRoomService`] backs tests and
//! the native driver.

use crate::elements::{Element, ElementId};
use crate::identity::Identity;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;
use uuid::Uuid;

/// Identifies one client's membership in a room.
pub type ConnectionId = Uuid;

/// Room errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Connection is offline")]
    Offline,
    #[error("Not connected to room {0}")]
    Closed(String),
}

/// The replicated document of a room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedStorage {
    pub elements: Vec<Element>,
    /// Last selection mirrored by any participant.
    #[serde(default)]
    pub selected_element: Option<ElementId>,
    /// Bumped by the service on every mutation. Orders changes within a room.
    #[serde(default)]
    pub version: u64,
}

/// Ephemeral per-client state visible to the other participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    pub user: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_element: Option<ElementId>,
}

impl Presence {
    pub fn new(user: Identity) -> Self {
        Self {
            user,
            cursor: None,
            selected_element: None,
        }
    }

    pub fn apply(&mut self, patch: &PresencePatch) {
        if let Some(cursor) = patch.cursor {
            self.cursor = cursor;
        }
        if let Some(selected) = patch.selected_element {
            self.selected_element = selected;
        }
    }
}

/// Partial presence update. `Some(None)` clears a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresencePatch {
    pub cursor: Option<Option<Point>>,
    pub selected_element: Option<Option<ElementId>>,
}

/// Notification that another participant changed the shared storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub origin: ConnectionId,
    pub storage: SharedStorage,
}

/// Callback invoked on storage changes.
pub type StorageListener = Box<dyn FnMut(&StorageChange)>;

/// A joined room.
pub trait RoomHandle {
    fn connection_id(&self) -> ConnectionId;

    fn room_id(&self) -> &str;

    fn update_presence(&self, patch: PresencePatch) -> Result<(), RoomError>;

    /// Register a callback for changes made by other participants.
    fn on_storage_change(&self, listener: StorageListener);

    /// Apply a mutation to the shared storage. The service serializes
    /// mutations, bumps the storage version and notifies every other
    /// participant. Returns the version the mutation produced.
    fn mutate_storage(
        &self,
        mutation: Box<dyn FnOnce(&mut SharedStorage) + '_>,
    ) -> Result<u64, RoomError>;

    /// Current value of the shared storage.
    fn storage(&self) -> Result<SharedStorage, RoomError>;

    /// Presence of the other participants.
    fn others(&self) -> Vec<(ConnectionId, Presence)>;

    /// Leave the room. Calling it twice is harmless.
    fn leave(&self);
}

/// Entry point to the realtime backend.
pub trait RoomService {
    /// Join a room. `initial_storage` is used only if the room is new.
    fn join(
        &self,
        room_id: &str,
        presence: Presence,
        initial_storage: SharedStorage,
    ) -> Result<Box<dyn RoomHandle>, RoomError>;
}

struct Peer {
    presence: Presence,
    listeners: Vec<Rc<RefCell<StorageListener>>>,
    offline: bool,
}

struct RoomState {
    storage: SharedStorage,
    peers: HashMap<ConnectionId, Peer>,
}

/// Single-threaded in-process room service.
///
/// Clones share the same rooms, so every session of a process can join the
/// same room through its own clone.
#[derive(Clone, Default)]
pub struct MemoryRoomService {
    rooms: Rc<RefCell<HashMap<String, RoomState>>>,
}

impl MemoryRoomService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut a connection off (or restore it). While offline its mutations
    /// fail with [`RoomError::Offline`] and it receives no notifications.
    pub fn set_offline(&self, room_id: &str, connection: ConnectionId, offline: bool) -> bool {
        let mut rooms = self.rooms.borrow_mut();
        let Some(peer) = rooms
            .get_mut(room_id)
            .and_then(|room| room.peers.get_mut(&connection))
        else {
            return false;
        };
        peer.offline = offline;
        log::debug!(
            "Connection {} in room {} is now {}",
            connection,
            room_id,
            if offline { "offline" } else { "online" }
        );
        true
    }

    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms
            .borrow()
            .get(room_id)
            .map(|room| room.peers.len())
            .unwrap_or(0)
    }

    /// Server-side view of a room's storage.
    pub fn storage(&self, room_id: &str) -> Option<SharedStorage> {
        self.rooms
            .borrow()
            .get(room_id)
            .map(|room| room.storage.clone())
    }
}

impl RoomService for MemoryRoomService {
    fn join(
        &self,
        room_id: &str,
        presence: Presence,
        initial_storage: SharedStorage,
    ) -> Result<Box<dyn RoomHandle>, RoomError> {
        let connection = Uuid::new_v4();
        let mut rooms = self.rooms.borrow_mut();
        let room = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| RoomState {
                storage: initial_storage,
                peers: HashMap::new(),
            });
        room.peers.insert(
            connection,
            Peer {
                presence,
                listeners: Vec::new(),
                offline: false,
            },
        );
        log::info!(
            "Connection {} joined room {} ({} peers)",
            connection,
            room_id,
            room.peers.len()
        );

        Ok(Box::new(MemoryRoomHandle {
            service: self.clone(),
            room_id: room_id.to_string(),
            connection,
        }))
    }
}

/// Handle returned by [`MemoryRoomService::join`].
pub struct MemoryRoomHandle {
    service: MemoryRoomService,
    room_id: String,
    connection: ConnectionId,
}

impl MemoryRoomHandle {
    fn closed(&self) -> RoomError {
        RoomError::Closed(self.room_id.clone())
    }
}

impl RoomHandle for MemoryRoomHandle {
    fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    fn room_id(&self) -> &str {
        &self.room_id
    }

    fn update_presence(&self, patch: PresencePatch) -> Result<(), RoomError> {
        let mut rooms = self.service.rooms.borrow_mut();
        let peer = rooms
            .get_mut(&self.room_id)
            .and_then(|room| room.peers.get_mut(&self.connection))
            .ok_or_else(|| self.closed())?;
        if peer.offline {
            return Err(RoomError::Offline);
        }
        peer.presence.apply(&patch);
        Ok(())
    }

    fn on_storage_change(&self, listener: StorageListener) {
        let mut rooms = self.service.rooms.borrow_mut();
        if let Some(peer) = rooms
            .get_mut(&self.room_id)
            .and_then(|room| room.peers.get_mut(&self.connection))
        {
            peer.listeners.push(Rc::new(RefCell::new(listener)));
        }
    }

    fn mutate_storage(
        &self,
        mutation: Box<dyn FnOnce(&mut SharedStorage) + '_>,
    ) -> Result<u64, RoomError> {
        let (change, listeners) = {
            let mut rooms = self.service.rooms.borrow_mut();
            let room = rooms.get_mut(&self.room_id).ok_or_else(|| self.closed())?;
            match room.peers.get(&self.connection) {
                None => return Err(self.closed()),
                Some(peer) if peer.offline => return Err(RoomError::Offline),
                Some(_) => {}
            }

            mutation(&mut room.storage);
            room.storage.version += 1;

            let change = StorageChange {
                origin: self.connection,
                storage: room.storage.clone(),
            };
            let listeners: Vec<_> = room
                .peers
                .iter()
                .filter(|(id, peer)| **id != self.connection && !peer.offline)
                .flat_map(|(_, peer)| peer.listeners.iter().cloned())
                .collect();
            (change, listeners)
        };

        // Rooms borrow is released so listeners may touch the service.
        for listener in listeners {
            (listener.borrow_mut())(&change);
        }
        Ok(change.storage.version)
    }

    fn storage(&self) -> Result<SharedStorage, RoomError> {
        self.service
            .storage(&self.room_id)
            .ok_or_else(|| self.closed())
    }

    fn others(&self) -> Vec<(ConnectionId, Presence)> {
        self.service
            .rooms
            .borrow()
            .get(&self.room_id)
            .map(|room| {
                room.peers
                    .iter()
                    .filter(|(id, _)| **id != self.connection)
                    .map(|(id, peer)| (*id, peer.presence.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn leave(&self) {
        let mut rooms = self.service.rooms.borrow_mut();
        if let Some(room) = rooms.get_mut(&self.room_id) {
            if room.peers.remove(&self.connection).is_some() {
                log::info!("Connection {} left room {}", self.connection, self.room_id);
            }
        }
    }
}
