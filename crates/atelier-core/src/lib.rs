//! Atelier Core Library
//!
//! Collaborative canvas state for Atelier: the element store, layer flags,
//! prototype connections, undo history and the bridge that keeps every
//! participant of a room in step.

pub mod config;
pub mod connections;
pub mod elements;
pub mod events;
pub mod frames;
pub mod history;
pub mod identity;
pub mod layers;
pub mod room;
pub mod session;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::{ConfigError, SessionConfig};
pub use connections::{Connection, ConnectionGraph, ConnectionType, connection_curve};
pub use elements::{Element, ElementId, ElementKind, ElementPatch, ElementStyle, SerializableColor};
pub use events::{ChangeOrigin, SessionEvent, SubscriptionId};
pub use frames::{Frame, FrameId};
pub use history::{HistoryError, HistoryManager, Snapshot};
pub use identity::{Identity, IdentityProvider, StaticIdentity};
pub use layers::{LayerBus, LayerFlag, LayerFlags};
pub use room::{MemoryRoomService, Presence, RoomError, RoomHandle, RoomService, SharedStorage};
pub use session::{Session, SessionError};
pub use store::{ElementStore, StoreError};
pub use sync::{SyncBridge, SyncError};

#[cfg(test)]
pub(crate) mod test_util {
    /// Simple blocking executor for tests.
    pub fn block_on<F: std::future::Future>(f: F) -> F::Output {
        use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

        fn dummy_raw_waker() -> RawWaker {
            fn no_op(_: *const ()) {}
            fn clone(_: *const ()) -> RawWaker {
                dummy_raw_waker()
            }
            static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
            RawWaker::new(std::ptr::null(), &VTABLE)
        }

        let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
        let mut cx = Context::from_waker(&waker);
        let mut f = std::pin::pin!(f);

        loop {
            if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
                return result;
            }
        }
    }
}
