//! Typed publish/subscribe over weakly held subscribers.
//!
//! A [`Router`] maps each payload type to a [`Channel`]. Channels hold
//! [`CallbackHandle`]s whose owners are referenced weakly, so a registration
//! never keeps its subscriber alive. Dead handles are pruned on publish.

pub mod channel;
pub mod handle;
pub mod handler;
pub mod pool;
pub mod router;
pub mod typed_channel;

use std::any::Any;
use std::any::TypeId;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

pub use channel::Channel;
pub use handle::Callback;
pub use handle::CallbackFn;
pub use handle::CallbackHandle;
pub use handle::CallbackShape;
pub use handle::HandlerFuture;
pub use handle::HandlerResult;
pub use handle::Payload;
pub use handler::Handler;
pub use router::Router;
pub use typed_channel::TypedChannel;

/// Marker trait for payload types that can be published.
///
/// Automatically implemented for all types that are thread-safe and have
/// a static lifetime.
pub trait Event: Any + Send + Sync + 'static {
    /// Get the name of the event type.
    fn event_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T: Any + Send + Sync + 'static> Event for T {}

/// Stable identifier of one payload type's stream of events.
#[derive(Clone, Copy)]
pub struct EventKind {
    id: TypeId,
    name: &'static str,
}

impl EventKind {
    pub fn of<T: Event>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventKind {}

impl Hash for EventKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
