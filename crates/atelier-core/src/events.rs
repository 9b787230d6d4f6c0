//! Change notifications for views observing a session.

use crate::elements::ElementId;
use crate::layers::LayerFlag;

/// Where an element change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A local edit.
    Local,
    /// A fold of another participant's storage.
    Remote,
    /// An undo or redo.
    History,
}

/// Events emitted by a [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ElementsChanged { origin: ChangeOrigin },
    SelectionChanged { selected: Option<ElementId> },
    LayerChanged { element: ElementId, flag: LayerFlag, value: bool },
    ConnectionsChanged,
    FramesChanged,
    /// A push to the room failed; local state is ahead of the room.
    SyncPushFailed { message: String },
}

pub type SubscriptionId = u64;

type Handler = Box<dyn FnMut(&SessionEvent)>;

/// Registered event handlers.
#[derive(Default)]
pub struct Subscribers {
    next_id: SubscriptionId,
    handlers: Vec<(SubscriptionId, Handler)>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("handlers", &format!("<{} handlers>", self.handlers.len()))
            .finish()
    }
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Keep the id to unsubscribe later.
    pub fn subscribe(&mut self, handler: impl FnMut(&SessionEvent) + 'static) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    /// Deliver an event to every handler in subscription order.
    pub fn emit(&mut self, event: SessionEvent) {
        for (_, handler) in &mut self.handlers {
            handler(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
