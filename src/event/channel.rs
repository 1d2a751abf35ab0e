//! Per-event-kind subscriber list and concurrent fan-out.
//!
//! ## Rules
//! - The guard protects the handle list only; it is never held while a
//!   handler runs or across an await.
//! - Publish prunes dead handles and takes the live snapshot in one pass.
//! - Handlers of one publish run concurrently; a failing handler never stops
//!   its siblings. The first failure is returned once all have finished.
//! - Removed handles are dropped after the guard is released.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::config::RouterConfig;
use crate::error::DispatchError;
use crate::event::EventKind;
use crate::event::handle::Callback;
use crate::event::handle::CallbackHandle;
use crate::event::handle::HandlerFuture;
use crate::event::handle::Payload;
use crate::event::pool::PooledVec;
use crate::event::pool::ScratchPool;

pub struct Channel {
    kind: EventKind,
    handles: Mutex<Vec<CallbackHandle>>,
    scratch: ScratchPool<CallbackHandle>,
}

impl Channel {
    pub fn new(kind: EventKind) -> Self {
        Self::with_config(kind, &RouterConfig::default())
    }

    pub fn with_config(kind: EventKind, config: &RouterConfig) -> Self {
        Self {
            kind,
            handles: Mutex::new(Vec::new()),
            scratch: ScratchPool::from_config(config),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CallbackHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of registrations whose owner is still alive.
    ///
    /// Walks the whole list; meant for diagnostics and tests.
    pub fn subscriber_count(&self) -> usize {
        self.lock().iter().filter(|h| h.is_live()).count()
    }

    /// Number of registrations, including dead ones not yet pruned.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Adds a registration. Subscribing the same callback twice yields two
    /// independent registrations.
    pub fn subscribe(&self, callback: Callback) {
        let handle = CallbackHandle::new(callback);
        let shape = handle.shape();
        let count = {
            let mut handles = self.lock();
            handles.push(handle);
            handles.len()
        };
        trace!(event = self.kind.name(), ?shape, count, "Subscribed");
    }

    /// Removes every registration matching `callback`; returns how many remain.
    pub fn unsubscribe_callback(&self, callback: &Callback) -> usize {
        let remaining = self.remove_where(|h| h.matches_callback(callback));
        trace!(event = self.kind.name(), remaining, "Unsubscribed callback");
        remaining
    }

    /// Removes every registration owned by `owner`; returns how many remain.
    pub fn unsubscribe_owner<O: ?Sized>(&self, owner: &Arc<O>) -> usize {
        let remaining = self.remove_where(|h| h.matches_owner(owner));
        trace!(event = self.kind.name(), remaining, "Unsubscribed owner");
        remaining
    }

    /// Drops registrations whose owner is gone; returns how many remain.
    pub fn prune(&self) -> usize {
        self.remove_where(|h| !h.is_live())
    }

    fn remove_where(&self, pred: impl Fn(&CallbackHandle) -> bool) -> usize {
        let mut removed = self.scratch.acquire();
        let mut handles = self.lock();
        let mut i = 0;
        while i < handles.len() {
            if pred(&handles[i]) {
                removed.push(handles.swap_remove(i));
            } else {
                i += 1;
            }
        }
        let remaining = handles.len();
        drop(handles);
        remaining
    }

    /// Delivers one event to every live registration and waits for all of them.
    ///
    /// Pruning, the live snapshot and the payload check happen when this is
    /// called, before the returned future is polled. `payload` is required as
    /// soon as a live handler declares one; otherwise nothing is invoked and
    /// [`DispatchError::MissingPayload`] is returned. Handlers declaring a
    /// cancellation argument get `cancel`, or a token that is never cancelled
    /// when `None`.
    pub fn publish(
        &self,
        payload: Option<Payload>,
        cancel: Option<CancellationToken>,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send + '_ {
        let snapshot = self.snapshot(payload.is_some());
        async move {
            let live = match snapshot {
                Ok(live) => live,
                Err(e) => return Err(e),
            };
            if live.is_empty() {
                return Ok(());
            }
            let cancel = cancel.unwrap_or_default();
            let inflight: Vec<HandlerFuture> = live
                .iter()
                .map(|h| h.invoke(payload.as_ref(), &cancel))
                .collect();
            drop(live);

            let mut failed = 0;
            let mut first = None;
            for result in join_all(inflight).await {
                if let Err(e) = result {
                    failed += 1;
                    let error = format!("{e:#}");
                    warn!(event = self.kind.name(), %error, "Event handler failed");
                    first.get_or_insert(e);
                }
            }

            match first {
                None => Ok(()),
                Some(source) => Err(DispatchError::HandlerFailed {
                    kind: self.kind.name(),
                    failed,
                    source,
                }),
            }
        }
    }

    /// Prunes dead handles and returns the live ones, or `MissingPayload`
    /// when one of them needs a payload that is not there.
    fn snapshot(
        &self,
        has_payload: bool,
    ) -> Result<PooledVec<'_, CallbackHandle>, DispatchError> {
        let mut live = self.scratch.acquire();
        let mut dead = self.scratch.acquire();
        {
            let mut handles = self.lock();
            partition_live(&mut handles, &mut live, &mut dead);
        }
        if !dead.is_empty() {
            debug!(
                event = self.kind.name(),
                pruned = dead.len(),
                live = live.len(),
                "Pruned dead subscribers"
            );
        }
        if !has_payload && live.iter().any(|h| h.shape().accepts_payload()) {
            return Err(DispatchError::MissingPayload);
        }
        Ok(live)
    }
}

/// Single pass over `handles`: live ones are compacted to the front and
/// cloned into `live`, dead ones are moved into `dead`.
fn partition_live(
    handles: &mut Vec<CallbackHandle>,
    live: &mut Vec<CallbackHandle>,
    dead: &mut Vec<CallbackHandle>,
) {
    let mut kept = 0;
    for i in 0..handles.len() {
        if handles[i].is_live() {
            live.push(handles[i].clone());
            handles.swap(kept, i);
            kept += 1;
        }
    }
    dead.extend(handles.drain(kept..));
}
