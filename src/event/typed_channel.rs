use std::marker::PhantomData;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RouterConfig;
use crate::error::DispatchError;
use crate::event::Event;
use crate::event::EventKind;
use crate::event::channel::Channel;
use crate::event::handler::Handler;

/// A [`Channel`] that only accepts handlers and payloads of type `T`.
pub struct TypedChannel<T> {
    channel: Arc<Channel>,
    _marker: PhantomData<fn(Arc<T>)>,
}

impl<T: Event> TypedChannel<T> {
    pub fn new() -> Self {
        Self::with_config(&RouterConfig::default())
    }

    pub fn with_config(config: &RouterConfig) -> Self {
        Self::from_channel(Arc::new(Channel::with_config(EventKind::of::<T>(), config)))
    }

    /// Wraps a channel created for `T`.
    pub(crate) fn from_channel(channel: Arc<Channel>) -> Self {
        debug_assert!(channel.kind() == EventKind::of::<T>());
        Self {
            channel,
            _marker: PhantomData,
        }
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn subscriber_count(&self) -> usize {
        self.channel.subscriber_count()
    }

    pub fn subscribe(&self, handler: &Handler<T>) {
        self.channel.subscribe(handler.callback().clone());
    }

    /// Removes every registration of `handler`; returns how many remain.
    pub fn unsubscribe(&self, handler: &Handler<T>) -> usize {
        self.channel.unsubscribe_callback(handler.callback())
    }

    pub fn unsubscribe_owner<O: ?Sized>(&self, owner: &Arc<O>) -> usize {
        self.channel.unsubscribe_owner(owner)
    }

    pub async fn publish(
        &self,
        payload: T,
        cancel: Option<CancellationToken>,
    ) -> Result<(), DispatchError> {
        self.publish_shared(Arc::new(payload), cancel).await
    }

    pub async fn publish_shared(
        &self,
        payload: Arc<T>,
        cancel: Option<CancellationToken>,
    ) -> Result<(), DispatchError> {
        self.channel.publish(Some(payload), cancel).await
    }
}

impl<T: Event> Default for TypedChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use super::*;

    struct Resized {
        width: u32,
    }

    #[tokio::test]
    async fn test_typed_publish_reaches_all_shapes() {
        let channel = TypedChannel::<Resized>::new();
        let total = Arc::new(AtomicU32::new(0));

        let t = total.clone();
        let payload = Handler::new(move |e: Arc<Resized>| {
            let t = t.clone();
            async move {
                t.fetch_add(e.width, Ordering::SeqCst);
                Ok(())
            }
        });
        let t = total.clone();
        let no_args = Handler::sync_no_args(move || {
            t.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let t = total.clone();
        let cancellable = Handler::with_cancellation(move |e: Arc<Resized>, cancel| {
            let t = t.clone();
            async move {
                if !cancel.is_cancelled() {
                    t.fetch_add(e.width * 10, Ordering::SeqCst);
                }
                Ok(())
            }
        });

        channel.subscribe(&payload);
        channel.subscribe(&no_args);
        channel.subscribe(&cancellable);
        assert_eq!(channel.subscriber_count(), 3);

        channel.publish(Resized { width: 2 }, None).await.unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 2 + 1 + 20);

        assert_eq!(channel.unsubscribe(&no_args), 2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        channel
            .publish(Resized { width: 1 }, Some(cancel))
            .await
            .unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 23 + 1);
    }
}
