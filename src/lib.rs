//! weakbus - A typed, in-process event dispatcher with weakly held subscribers.
//!
//! This crate provides:
//! - Per-payload-type channels routed by a shared [`Router`]
//! - Sync, async and cancellation-aware handlers behind one [`Handler`] type
//! - Subscribers held by `Weak` references, pruned once they are dropped
//! - Concurrent fan-out that runs every handler even when one fails

pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod subscriber;

pub use error::DispatchError;
pub use event::Event;
pub use event::EventKind;
pub use event::Handler;
pub use event::Router;
pub use event::TypedChannel;
pub use subscriber::Subscriber;
