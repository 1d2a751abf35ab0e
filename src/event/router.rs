//! Routes subscriptions and events to per-type channels.
//!
//! Channels are created on first subscribe and removed once an unsubscribe
//! or a publish leaves them empty. Subscribe appends while holding the map's
//! read lock and removal re-checks emptiness under the write lock, so a
//! registration can never land in a channel that has just been removed.
//! Unsubscribing works on a cloned channel with the map unlocked, so a
//! removed handler may call back into the router from its destructor.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RouterConfig;
use crate::error::DispatchError;
use crate::event::Event;
use crate::event::EventKind;
use crate::event::channel::Channel;
use crate::event::handler::Handler;
use crate::event::typed_channel::TypedChannel;
use crate::subscriber::Subscriber;

type Channels = HashMap<EventKind, Arc<Channel>>;

static GLOBAL: OnceLock<Router> = OnceLock::new();

pub struct Router {
    channels: RwLock<Channels>,
    config: RouterConfig,
}

impl Router {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Process-wide router with the default configuration.
    pub fn global() -> &'static Router {
        GLOBAL.get_or_init(Router::new)
    }

    fn read(&self) -> RwLockReadGuard<'_, Channels> {
        self.channels.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Channels> {
        self.channels.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, kind: &EventKind) -> Option<Arc<Channel>> {
        self.read().get(kind).cloned()
    }

    pub fn subscribe<T: Event>(&self, handler: &Handler<T>) {
        let kind = EventKind::of::<T>();
        {
            let channels = self.read();
            if let Some(channel) = channels.get(&kind) {
                channel.subscribe(handler.callback().clone());
                return;
            }
        }

        let mut channels = self.write();
        let channel = channels.entry(kind).or_insert_with(|| {
            debug!(event = kind.name(), "Creating channel");
            Arc::new(Channel::with_config(kind, &self.config))
        });
        channel.subscribe(handler.callback().clone());
    }

    /// Registers `subscriber` for `T`, held weakly.
    ///
    /// Each delivered event runs [`Subscriber::callback`] and, if it
    /// succeeded, [`Subscriber::after_delivery`]. The returned handler can be
    /// passed to [`Router::unsubscribe`].
    pub fn subscribe_subscriber<T, S>(&self, subscriber: &Arc<S>) -> Handler<T>
    where
        T: Event,
        S: Subscriber<T> + Send + Sync + 'static,
    {
        let handler = Handler::bound(subscriber, |subscriber: Arc<S>, event: Arc<T>| async move {
            subscriber.callback(event).await?;
            subscriber.after_delivery();
            Ok(())
        });
        self.subscribe(&handler);
        handler
    }

    /// Removes every registration of `handler`; returns how many remain for `T`.
    pub fn unsubscribe<T: Event>(&self, handler: &Handler<T>) -> usize {
        let kind = EventKind::of::<T>();
        let Some(channel) = self.get(&kind) else {
            return 0;
        };
        let remaining = channel.unsubscribe_callback(handler.callback());
        if remaining == 0 {
            self.remove_if_empty(&kind);
        }
        remaining
    }

    /// Removes every registration owned by `owner`, across all event kinds.
    ///
    /// Call this from the owner's teardown to stop deliveries immediately
    /// instead of waiting for the owner to be dropped.
    pub fn unsubscribe_owner<O: ?Sized>(&self, owner: &Arc<O>) {
        let channels: Vec<(EventKind, Arc<Channel>)> = self
            .read()
            .iter()
            .map(|(kind, channel)| (*kind, channel.clone()))
            .collect();
        for (kind, channel) in channels {
            if channel.unsubscribe_owner(owner) == 0 {
                self.remove_if_empty(&kind);
            }
        }
    }

    pub async fn publish<T: Event>(&self, payload: T) -> Result<(), DispatchError> {
        self.publish_shared(Arc::new(payload), None).await
    }

    pub async fn publish_with_cancellation<T: Event>(
        &self,
        payload: T,
        cancel: CancellationToken,
    ) -> Result<(), DispatchError> {
        self.publish_shared(Arc::new(payload), Some(cancel)).await
    }

    /// Delivers an already shared payload to the live subscribers of `T`.
    ///
    /// Completes immediately when `T` has no channel.
    pub async fn publish_shared<T: Event>(
        &self,
        payload: Arc<T>,
        cancel: Option<CancellationToken>,
    ) -> Result<(), DispatchError> {
        let kind = EventKind::of::<T>();
        let Some(channel) = self.get(&kind) else {
            return Ok(());
        };
        let result = TypedChannel::<T>::from_channel(channel.clone())
            .publish_shared(payload, cancel)
            .await;
        if channel.is_empty() {
            self.remove_if_empty(&kind);
        }
        result
    }

    fn remove_if_empty(&self, kind: &EventKind) {
        let mut channels = self.write();
        if channels.get(kind).is_some_and(|channel| channel.is_empty()) {
            channels.remove(kind);
            debug!(event = kind.name(), "Removed empty channel");
        }
    }

    /// The channel for `T`, if one currently exists.
    ///
    /// Subscribing through the returned channel bypasses the router's
    /// bookkeeping; use [`Router::subscribe`] instead.
    pub fn channel<T: Event>(&self) -> Option<TypedChannel<T>> {
        self.get(&EventKind::of::<T>())
            .map(TypedChannel::from_channel)
    }

    pub fn contains<T: Event>(&self) -> bool {
        self.read().contains_key(&EventKind::of::<T>())
    }

    /// Live registrations for `T`; 0 when no channel exists.
    pub fn subscriber_count<T: Event>(&self) -> usize {
        self.get(&EventKind::of::<T>())
            .map_or(0, |channel| channel.subscriber_count())
    }

    /// Number of event kinds that currently have a channel.
    pub fn channel_count(&self) -> usize {
        self.read().len()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
