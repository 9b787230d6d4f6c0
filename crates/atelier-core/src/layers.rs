//! Per-viewer layer visibility and lock flags.
//!
//! These flags are presentation state for one viewer. They are never written
//! to the shared room storage. Sessions of the same browser mirror them to
//! each other through a [`LayerBus`], and they are persisted locally through
//! the [`Storage`](crate::storage::Storage) trait.

use crate::elements::ElementId;
use crate::storage::{Storage, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast::{self, error::TryRecvError};
use uuid::Uuid;

/// Which flag map an update refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerFlag {
    Hidden,
    Locked,
}

/// Hidden and locked maps keyed by element id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerFlags {
    hidden: HashMap<ElementId, bool>,
    locked: HashMap<ElementId, bool>,
}

impl LayerFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_hidden(&self, id: ElementId) -> bool {
        self.hidden.get(&id).copied().unwrap_or(false)
    }

    pub fn is_locked(&self, id: ElementId) -> bool {
        self.locked.get(&id).copied().unwrap_or(false)
    }

    pub fn get(&self, flag: LayerFlag, id: ElementId) -> bool {
        match flag {
            LayerFlag::Hidden => self.is_hidden(id),
            LayerFlag::Locked => self.is_locked(id),
        }
    }

    /// Set a flag. Returns true if the value changed.
    pub fn set(&mut self, flag: LayerFlag, id: ElementId, value: bool) -> bool {
        let map = self.map_mut(flag);
        let previous = map.get(&id).copied().unwrap_or(false);
        map.insert(id, value);
        previous != value
    }

    /// Flip visibility and return the new hidden state.
    pub fn toggle_visibility(&mut self, id: ElementId) -> bool {
        let hidden = !self.is_hidden(id);
        self.hidden.insert(id, hidden);
        hidden
    }

    /// Flip the lock and return the new locked state.
    pub fn toggle_lock(&mut self, id: ElementId) -> bool {
        let locked = !self.is_locked(id);
        self.locked.insert(id, locked);
        locked
    }

    pub fn hidden_map(&self) -> &HashMap<ElementId, bool> {
        &self.hidden
    }

    pub fn locked_map(&self) -> &HashMap<ElementId, bool> {
        &self.locked
    }

    /// Copy keeping only set flags of elements for which `exists` holds.
    pub fn retained(&self, exists: impl Fn(ElementId) -> bool) -> Self {
        let keep = |map: &HashMap<ElementId, bool>| -> HashMap<ElementId, bool> {
            map.iter()
                .filter(|&(&id, &value)| value && exists(id))
                .map(|(&id, &value)| (id, value))
                .collect()
        };
        Self {
            hidden: keep(&self.hidden),
            locked: keep(&self.locked),
        }
    }

    fn map_mut(&mut self, flag: LayerFlag) -> &mut HashMap<ElementId, bool> {
        match flag {
            LayerFlag::Hidden => &mut self.hidden,
            LayerFlag::Locked => &mut self.locked,
        }
    }

    /// Load both maps from local storage. Missing keys leave the map empty.
    pub async fn load(
        storage: &dyn Storage,
        hidden_key: &str,
        locked_key: &str,
    ) -> StorageResult<Self> {
        Ok(Self {
            hidden: load_map(storage, hidden_key).await?,
            locked: load_map(storage, locked_key).await?,
        })
    }

    /// Write both maps to local storage.
    pub async fn save(
        &self,
        storage: &dyn Storage,
        hidden_key: &str,
        locked_key: &str,
    ) -> StorageResult<()> {
        save_map(storage, hidden_key, &self.hidden).await?;
        save_map(storage, locked_key, &self.locked).await
    }
}

async fn load_map(storage: &dyn Storage, key: &str) -> StorageResult<HashMap<ElementId, bool>> {
    match storage.get(key).await {
        Ok(json) => serde_json::from_str(&json)
            .map_err(|e| StorageError::Serialization(format!("{}: {}", key, e))),
        Err(StorageError::NotFound(_)) => Ok(HashMap::new()),
        Err(e) => Err(e),
    }
}

async fn save_map(
    storage: &dyn Storage,
    key: &str,
    map: &HashMap<ElementId, bool>,
) -> StorageResult<()> {
    let json =
        serde_json::to_string(map).map_err(|e| StorageError::Serialization(e.to_string()))?;
    storage.set(key, &json).await
}

/// A flag change published to the other sessions of the same browser.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerUpdate {
    /// Tab that made the change.
    pub origin: Uuid,
    pub flag: LayerFlag,
    pub element: ElementId,
    pub value: bool,
}

/// Same-browser broadcast channel for layer flags.
///
/// Clone the bus into every session that should share flags.
#[derive(Debug, Clone)]
pub struct LayerBus {
    tx: broadcast::Sender<LayerUpdate>,
}

impl LayerBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Attach a new tab to the bus.
    pub fn connect(&self) -> LayerChannel {
        LayerChannel {
            tab_id: Uuid::new_v4(),
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for LayerBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// One tab's end of the [`LayerBus`].
#[derive(Debug)]
pub struct LayerChannel {
    tab_id: Uuid,
    tx: broadcast::Sender<LayerUpdate>,
    rx: broadcast::Receiver<LayerUpdate>,
}

impl LayerChannel {
    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    pub fn publish(&self, flag: LayerFlag, element: ElementId, value: bool) {
        let update = LayerUpdate {
            origin: self.tab_id,
            flag,
            element,
            value,
        };
        // No receivers simply means no other tab is open.
        let _ = self.tx.send(update);
    }

    /// Drain updates published by other tabs.
    pub fn drain(&mut self) -> Vec<LayerUpdate> {
        let mut updates = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(update) if update.origin == self.tab_id => {}
                Ok(update) => updates.push(update),
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("Layer channel lagged, {} updates dropped", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        updates
    }
}
