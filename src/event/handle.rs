//! One registered callback and the weak reference to its owner.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Weak;

use futures::FutureExt;
use futures::future;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;

pub type HandlerResult = anyhow::Result<()>;

/// Uniform completion type of every callback invocation.
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// Type-erased payload shared by all handlers of one publish.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Strong reference to the owner, captured for the duration of one call.
pub type OwnerRef = Arc<dyn Any + Send + Sync>;

type NoArgsFn = dyn Fn(Option<OwnerRef>) -> HandlerFuture + Send + Sync;
type PayloadFn = dyn Fn(Option<OwnerRef>, Payload) -> HandlerFuture + Send + Sync;
type CancellationFn = dyn Fn(Option<OwnerRef>, CancellationToken) -> HandlerFuture + Send + Sync;
type PayloadCancellationFn =
    dyn Fn(Option<OwnerRef>, Payload, CancellationToken) -> HandlerFuture + Send + Sync;

/// Which arguments a callback accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackShape {
    NoArgs,
    Payload,
    Cancellation,
    PayloadCancellation,
}

impl CallbackShape {
    pub fn accepts_payload(self) -> bool {
        matches!(self, Self::Payload | Self::PayloadCancellation)
    }

    pub fn accepts_cancellation(self) -> bool {
        matches!(self, Self::Cancellation | Self::PayloadCancellation)
    }
}

/// A callback in one of the four supported shapes.
///
/// Every variant receives the owner captured at invocation time, or `None`
/// for free-standing callbacks.
#[derive(Clone)]
pub enum CallbackFn {
    NoArgs(Arc<NoArgsFn>),
    Payload(Arc<PayloadFn>),
    Cancellation(Arc<CancellationFn>),
    PayloadCancellation(Arc<PayloadCancellationFn>),
}

impl CallbackFn {
    pub fn no_args<F>(f: F) -> Self
    where
        F: Fn(Option<OwnerRef>) -> HandlerFuture + Send + Sync + 'static,
    {
        Self::NoArgs(Arc::new(f))
    }

    pub fn payload<F>(f: F) -> Self
    where
        F: Fn(Option<OwnerRef>, Payload) -> HandlerFuture + Send + Sync + 'static,
    {
        Self::Payload(Arc::new(f))
    }

    pub fn cancellation<F>(f: F) -> Self
    where
        F: Fn(Option<OwnerRef>, CancellationToken) -> HandlerFuture + Send + Sync + 'static,
    {
        Self::Cancellation(Arc::new(f))
    }

    pub fn payload_cancellation<F>(f: F) -> Self
    where
        F: Fn(Option<OwnerRef>, Payload, CancellationToken) -> HandlerFuture + Send + Sync + 'static,
    {
        Self::PayloadCancellation(Arc::new(f))
    }

    pub fn shape(&self) -> CallbackShape {
        match self {
            Self::NoArgs(_) => CallbackShape::NoArgs,
            Self::Payload(_) => CallbackShape::Payload,
            Self::Cancellation(_) => CallbackShape::Cancellation,
            Self::PayloadCancellation(_) => CallbackShape::PayloadCancellation,
        }
    }

    fn addr(&self) -> *const () {
        match self {
            Self::NoArgs(f) => Arc::as_ptr(f) as *const (),
            Self::Payload(f) => Arc::as_ptr(f) as *const (),
            Self::Cancellation(f) => Arc::as_ptr(f) as *const (),
            Self::PayloadCancellation(f) => Arc::as_ptr(f) as *const (),
        }
    }

    /// Identity comparison: true only for clones of the same callback.
    pub fn same_as(&self, other: &CallbackFn) -> bool {
        std::ptr::addr_eq(self.addr(), other.addr())
    }
}

/// Non-owning reference to the object a callback is bound to.
#[derive(Clone)]
pub struct WeakOwner(Weak<dyn Any + Send + Sync>);

impl WeakOwner {
    pub fn new<O: Send + Sync + 'static>(owner: &Arc<O>) -> Self {
        let weak: Weak<O> = Arc::downgrade(owner);
        Self(weak)
    }

    /// Snapshot of liveness. Never creates a strong reference.
    pub fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn upgrade(&self) -> Option<OwnerRef> {
        self.0.upgrade()
    }

    pub fn is<O: ?Sized>(&self, owner: &Arc<O>) -> bool {
        std::ptr::addr_eq(self.0.as_ptr(), Arc::as_ptr(owner))
    }

    fn same_as(&self, other: &WeakOwner) -> bool {
        std::ptr::addr_eq(self.0.as_ptr(), other.0.as_ptr())
    }
}

/// A callback plus its optional owner, as handed to [`Channel::subscribe`].
///
/// [`Channel::subscribe`]: crate::event::Channel::subscribe
#[derive(Clone)]
pub struct Callback {
    owner: Option<WeakOwner>,
    func: CallbackFn,
}

impl Callback {
    /// A free-standing callback, always considered live.
    pub fn new(func: CallbackFn) -> Self {
        Self { owner: None, func }
    }

    /// A callback that stops being invoked once `owner` is dropped.
    pub fn owned_by<O: Send + Sync + 'static>(func: CallbackFn, owner: &Arc<O>) -> Self {
        Self {
            owner: Some(WeakOwner::new(owner)),
            func,
        }
    }

    pub fn has_owner(&self) -> bool {
        self.owner.is_some()
    }

    pub fn shape(&self) -> CallbackShape {
        self.func.shape()
    }

    pub fn func(&self) -> &CallbackFn {
        &self.func
    }

    /// Same callback identity and same owner identity.
    pub fn matches(&self, other: &Callback) -> bool {
        same_owner(&self.owner, &other.owner) && self.func.same_as(&other.func)
    }
}

/// A registered callback held by a [`Channel`](crate::event::Channel).
#[derive(Clone)]
pub struct CallbackHandle {
    owner: Option<WeakOwner>,
    func: CallbackFn,
    shape: CallbackShape,
}

impl CallbackHandle {
    pub fn new(callback: Callback) -> Self {
        let shape = callback.func.shape();
        Self {
            owner: callback.owner,
            func: callback.func,
            shape,
        }
    }

    pub fn shape(&self) -> CallbackShape {
        self.shape
    }

    pub fn is_live(&self) -> bool {
        self.owner.as_ref().is_none_or(WeakOwner::is_live)
    }

    pub fn matches_callback(&self, callback: &Callback) -> bool {
        same_owner(&self.owner, &callback.owner) && self.func.same_as(&callback.func)
    }

    pub fn matches_owner<O: ?Sized>(&self, owner: &Arc<O>) -> bool {
        self.owner.as_ref().is_some_and(|o| o.is(owner))
    }

    /// Calls the callback with the arguments its shape declares.
    ///
    /// The owner is upgraded once; if it is gone the returned future is an
    /// already-completed no-op. Panics, whether raised while calling or while
    /// polling, come back as [`DispatchError::HandlerPanicked`].
    pub fn invoke(&self, payload: Option<&Payload>, cancel: &CancellationToken) -> HandlerFuture {
        let owner = match &self.owner {
            Some(weak) => match weak.upgrade() {
                Some(strong) => Some(strong),
                None => return future::ok(()).boxed(),
            },
            None => None,
        };

        let call = || match &self.func {
            CallbackFn::NoArgs(f) => f(owner),
            CallbackFn::Payload(f) => match payload {
                Some(payload) => f(owner, payload.clone()),
                None => future::err(anyhow::Error::new(DispatchError::MissingPayload)).boxed(),
            },
            CallbackFn::Cancellation(f) => f(owner, cancel.clone()),
            CallbackFn::PayloadCancellation(f) => match payload {
                Some(payload) => f(owner, payload.clone(), cancel.clone()),
                None => future::err(anyhow::Error::new(DispatchError::MissingPayload)).boxed(),
            },
        };

        match std::panic::catch_unwind(AssertUnwindSafe(call)) {
            Ok(fut) => AssertUnwindSafe(fut)
                .catch_unwind()
                .map(|result| result.unwrap_or_else(|panic| Err(panicked(panic))))
                .boxed(),
            Err(panic) => future::err(panicked(panic)).boxed(),
        }
    }
}

fn same_owner(a: &Option<WeakOwner>, b: &Option<WeakOwner>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_as(b),
        _ => false,
    }
}

fn panicked(panic: Box<dyn Any + Send>) -> anyhow::Error {
    let message = if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    };
    DispatchError::HandlerPanicked { message }.into()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    struct Owner;

    fn counting(counter: &Arc<AtomicUsize>) -> CallbackFn {
        let counter = counter.clone();
        CallbackFn::no_args(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            future::ok(()).boxed()
        })
    }

    #[tokio::test]
    async fn test_free_callback_is_always_live() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = CallbackHandle::new(Callback::new(counting(&counter)));

        assert!(handle.is_live());
        handle
            .invoke(None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dead_owner_skips_invocation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let owner = Arc::new(Owner);
        let handle = CallbackHandle::new(Callback::owned_by(counting(&counter), &owner));
        assert!(handle.is_live());

        drop(owner);
        assert!(!handle.is_live());
        handle
            .invoke(None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handle_does_not_keep_owner_alive() {
        let counter = Arc::new(AtomicUsize::new(0));
        let owner = Arc::new(Owner);
        let _handle = CallbackHandle::new(Callback::owned_by(counting(&counter), &owner));
        assert_eq!(Arc::strong_count(&owner), 1);
    }

    #[test]
    fn test_matching_is_by_identity() {
        let counter = Arc::new(AtomicUsize::new(0));
        let owner = Arc::new(Owner);
        let other_owner = Arc::new(Owner);
        let func = counting(&counter);

        let callback = Callback::owned_by(func.clone(), &owner);
        let handle = CallbackHandle::new(callback.clone());

        assert!(handle.matches_callback(&callback));
        assert!(!handle.matches_callback(&Callback::new(func.clone())));
        assert!(!handle.matches_callback(&Callback::owned_by(func, &other_owner)));
        assert!(!handle.matches_callback(&Callback::owned_by(counting(&counter), &owner)));
        assert!(handle.matches_owner(&owner));
        assert!(!handle.matches_owner(&other_owner));
    }

    #[test]
    fn test_shape_flags() {
        assert!(!CallbackShape::NoArgs.accepts_payload());
        assert!(CallbackShape::Payload.accepts_payload());
        assert!(CallbackShape::Cancellation.accepts_cancellation());
        assert!(CallbackShape::PayloadCancellation.accepts_payload());
        assert!(CallbackShape::PayloadCancellation.accepts_cancellation());
    }

    #[tokio::test]
    async fn test_cancellation_is_forwarded() {
        let func = CallbackFn::cancellation(|_, token| {
            async move {
                anyhow::ensure!(token.is_cancelled(), "token not forwarded");
                Ok(())
            }
            .boxed()
        });
        let handle = CallbackHandle::new(Callback::new(func));
        let token = CancellationToken::new();
        token.cancel();

        handle.invoke(None, &token).await.unwrap();
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let func = CallbackFn::no_args(|_| -> HandlerFuture { panic!("boom") });
        let handle = CallbackHandle::new(Callback::new(func));

        let err = handle
            .invoke(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));

        let func = CallbackFn::no_args(|_| async { panic!("later") }.boxed());
        let handle = CallbackHandle::new(Callback::new(func));
        let err = handle
            .invoke(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("later"));
    }

    #[tokio::test]
    async fn test_missing_payload_is_reported() {
        let func = CallbackFn::payload(|_, _| future::ok(()).boxed());
        let handle = CallbackHandle::new(Callback::new(func));

        let err = handle
            .invoke(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DispatchError>(),
            Some(DispatchError::MissingPayload)
        ));
    }
}
