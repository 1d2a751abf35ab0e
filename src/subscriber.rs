//! Objects that receive published events through their own methods.

use std::sync::Arc;

use anyhow::Result;

/// Trait for event subscribers.
///
/// Register with [`Router::subscribe_subscriber`]; the router holds the
/// subscriber weakly, so dropping the last `Arc` ends the subscription.
///
/// [`Router::subscribe_subscriber`]: crate::event::Router::subscribe_subscriber
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Subscriber<E: Send + Sync + 'static> {
    /// Called when an event of type E is published.
    async fn callback(&self, event: Arc<E>) -> Result<()>;

    /// Called after a successful [`callback`](Subscriber::callback), e.g. to
    /// schedule a UI refresh.
    fn after_delivery(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Router;

    #[derive(Debug)]
    struct ThemeChanged {
        dark: bool,
    }

    #[tokio::test]
    async fn test_subscriber_receives_event_then_refreshes() {
        let router = Router::new();
        let mut mock = MockSubscriber::<ThemeChanged>::new();
        mock.expect_callback()
            .withf(|event| event.dark)
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_after_delivery().times(1).return_const(());
        let subscriber = Arc::new(mock);

        router.subscribe_subscriber::<ThemeChanged, _>(&subscriber);
        router.publish(ThemeChanged { dark: true }).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_callback_skips_refresh() {
        let router = Router::new();
        let mut mock = MockSubscriber::<ThemeChanged>::new();
        mock.expect_callback()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("render failed")));
        mock.expect_after_delivery().never();
        let subscriber = Arc::new(mock);

        router.subscribe_subscriber::<ThemeChanged, _>(&subscriber);
        let err = router
            .publish(ThemeChanged { dark: false })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("render failed"));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_not_called() {
        let router = Router::new();
        let mut mock = MockSubscriber::<ThemeChanged>::new();
        mock.expect_callback().never();
        let subscriber = Arc::new(mock);

        router.subscribe_subscriber::<ThemeChanged, _>(&subscriber);
        drop(subscriber);

        router.publish(ThemeChanged { dark: true }).await.unwrap();
        assert_eq!(router.subscriber_count::<ThemeChanged>(), 0);
    }
}
