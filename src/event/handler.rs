//! Typed registration tokens.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::FutureExt;
use futures::future;
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;
use crate::event::Event;
use crate::event::handle::Callback;
use crate::event::handle::CallbackFn;
use crate::event::handle::CallbackShape;
use crate::event::handle::HandlerResult;
use crate::event::handle::OwnerRef;
use crate::event::handle::Payload;

/// A callback for payload type `T`, ready to be subscribed.
///
/// Keep a clone to unsubscribe later: clones share identity, while two
/// handlers built from the same closure are distinct registrations.
///
/// ```rust,ignore
/// let handler = Handler::new(|msg: Arc<Saved>| async move {
///     tracing::info!(id = msg.id, "saved");
///     Ok(())
/// });
/// router.subscribe(&handler);
/// router.publish(Saved { id: 7 }).await?;
/// router.unsubscribe(&handler);
/// ```
pub struct Handler<T> {
    callback: Callback,
    _marker: PhantomData<fn(Arc<T>)>,
}

impl<T: Event> Handler<T> {
    fn from_fn(func: CallbackFn) -> Self {
        Self {
            callback: Callback::new(func),
            _marker: PhantomData,
        }
    }

    fn bound_fn<O: Send + Sync + 'static>(owner: &Arc<O>, func: CallbackFn) -> Self {
        Self {
            callback: Callback::owned_by(func, owner),
            _marker: PhantomData,
        }
    }

    /// Async handler receiving the payload.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::from_fn(CallbackFn::payload(move |_, payload| {
            match downcast::<T>(payload) {
                Ok(payload) => f(payload).boxed(),
                Err(e) => future::err(e).boxed(),
            }
        }))
    }

    /// Async handler that only needs to know the event happened.
    pub fn no_args<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::from_fn(CallbackFn::no_args(move |_| f().boxed()))
    }

    /// Async handler receiving the payload and the publisher's cancellation token.
    pub fn with_cancellation<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<T>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::from_fn(CallbackFn::payload_cancellation(
            move |_, payload, cancel| match downcast::<T>(payload) {
                Ok(payload) => f(payload, cancel).boxed(),
                Err(e) => future::err(e).boxed(),
            },
        ))
    }

    /// Synchronous handler; runs when the publish fans out.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        Self::from_fn(CallbackFn::payload(move |_, payload| {
            future::ready(downcast::<T>(payload).and_then(|payload| f(payload.as_ref()))).boxed()
        }))
    }

    pub fn sync_no_args<F>(f: F) -> Self
    where
        F: Fn() -> HandlerResult + Send + Sync + 'static,
    {
        Self::from_fn(CallbackFn::no_args(move |_| future::ready(f()).boxed()))
    }

    /// Handler bound to `owner`, which is held weakly.
    ///
    /// Once `owner` is dropped the handler is skipped and pruned on the next
    /// publish. While a call is in progress the callback holds the owner.
    pub fn bound<O, F, Fut>(owner: &Arc<O>, f: F) -> Self
    where
        O: Send + Sync + 'static,
        F: Fn(Arc<O>, Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::bound_fn(
            owner,
            CallbackFn::payload(move |owner, payload| {
                let Some(owner) = downcast_owner::<O>(owner) else {
                    return future::ok(()).boxed();
                };
                match downcast::<T>(payload) {
                    Ok(payload) => f(owner, payload).boxed(),
                    Err(e) => future::err(e).boxed(),
                }
            }),
        )
    }

    pub fn bound_no_args<O, F, Fut>(owner: &Arc<O>, f: F) -> Self
    where
        O: Send + Sync + 'static,
        F: Fn(Arc<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::bound_fn(
            owner,
            CallbackFn::no_args(move |owner| match downcast_owner::<O>(owner) {
                Some(owner) => f(owner).boxed(),
                None => future::ok(()).boxed(),
            }),
        )
    }

    pub fn bound_with_cancellation<O, F, Fut>(owner: &Arc<O>, f: F) -> Self
    where
        O: Send + Sync + 'static,
        F: Fn(Arc<O>, Arc<T>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::bound_fn(
            owner,
            CallbackFn::payload_cancellation(move |owner, payload, cancel| {
                let Some(owner) = downcast_owner::<O>(owner) else {
                    return future::ok(()).boxed();
                };
                match downcast::<T>(payload) {
                    Ok(payload) => f(owner, payload, cancel).boxed(),
                    Err(e) => future::err(e).boxed(),
                }
            }),
        )
    }

    /// Ties a free-standing handler to the lifetime of `owner`.
    ///
    /// Bound handlers already have an owner and are returned unchanged.
    pub fn owned_by<O: Send + Sync + 'static>(self, owner: &Arc<O>) -> Self {
        if self.callback.has_owner() {
            return self;
        }
        Self::bound_fn(owner, self.callback.func().clone())
    }

    pub fn shape(&self) -> CallbackShape {
        self.callback.shape()
    }

    pub fn callback(&self) -> &Callback {
        &self.callback
    }
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Handler<T> {
    fn eq(&self, other: &Self) -> bool {
        self.callback.matches(&other.callback)
    }
}

impl<T> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("event", &std::any::type_name::<T>())
            .field("shape", &self.callback.shape())
            .field("owned", &self.callback.has_owner())
            .finish()
    }
}

fn downcast<T: Event>(payload: Payload) -> anyhow::Result<Arc<T>> {
    payload.downcast::<T>().map_err(|_| {
        DispatchError::PayloadMismatch {
            expected: std::any::type_name::<T>(),
        }
        .into()
    })
}

fn downcast_owner<O: Send + Sync + 'static>(owner: Option<OwnerRef>) -> Option<Arc<O>> {
    owner.and_then(|owner| owner.downcast::<O>().ok())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::event::CallbackHandle;

    struct Saved {
        id: u32,
    }

    struct Component {
        seen: Mutex<Vec<u32>>,
    }

    fn payload(id: u32) -> Payload {
        Arc::new(Saved { id })
    }

    #[tokio::test]
    async fn test_bound_handler_receives_owner_and_payload() {
        let component = Arc::new(Component {
            seen: Mutex::new(Vec::new()),
        });
        let handler = Handler::bound(&component, |c: Arc<Component>, msg: Arc<Saved>| async move {
            c.seen.lock().unwrap().push(msg.id);
            Ok(())
        });
        assert_eq!(handler.shape(), CallbackShape::Payload);

        let handle = CallbackHandle::new(handler.callback().clone());
        handle
            .invoke(Some(&payload(3)), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*component.seen.lock().unwrap(), vec![3]);
        assert_eq!(Arc::strong_count(&component), 1);
    }

    #[tokio::test]
    async fn test_wrong_payload_type_is_a_failure() {
        let handler = Handler::new(|_: Arc<Saved>| async { Ok(()) });
        let handle = CallbackHandle::new(handler.callback().clone());
        let wrong: Payload = Arc::new("not saved");

        let err = handle
            .invoke(Some(&wrong), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DispatchError>(),
            Some(DispatchError::PayloadMismatch { .. })
        ));
    }

    #[test]
    fn test_clones_share_identity() {
        let a = Handler::sync(|_: &Saved| Ok(()));
        let b = Handler::sync(|_: &Saved| Ok(()));

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_owned_by_attaches_owner_once() {
        let first = Arc::new(Component {
            seen: Mutex::new(Vec::new()),
        });
        let second = Arc::new(Component {
            seen: Mutex::new(Vec::new()),
        });
        let handler = Handler::<Saved>::sync_no_args(|| Ok(())).owned_by(&first);
        let handle = CallbackHandle::new(handler.callback().clone());
        assert!(handle.matches_owner(&first));

        let rebound = handler.clone().owned_by(&second);
        assert_eq!(rebound, handler);
        assert_eq!(handler.shape(), CallbackShape::NoArgs);
    }

    #[test]
    fn test_with_cancellation_shape() {
        let handler = Handler::with_cancellation(|_: Arc<Saved>, _| async { Ok(()) });
        assert_eq!(handler.shape(), CallbackShape::PayloadCancellation);
    }
}
