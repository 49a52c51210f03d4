//! Lifecycle event emission
//!
//! [`EventEmitter`] fans one value out to every subscribed handler and joins
//! on the results. Handlers are called synchronously, in subscription order,
//! during [`EventEmitter::emit`]. A handler may finish immediately or hand
//! back deferred work (a future or a stream); the future returned by `emit`
//! resolves once all deferred work has settled.
//!
//! Failure semantics:
//!
//! - Every handler is called even if an earlier one fails.
//! - The emission fails if any handler fails, synchronously or later.
//!   Synchronous failures are reported first, then deferred ones in
//!   subscription order.
//!
//! Subscribing or unsubscribing during an emission affects later emissions
//! only; `emit` works on a snapshot of the handler list.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{BoxStream, TryStreamExt};

use crate::error::Result;

/// What a handler hands back to the emitter.
pub enum HookOutcome {
    /// Nothing left to wait for.
    Done,
    /// Work the emission must wait for.
    Pending(BoxFuture<'static, Result<()>>),
    /// A lazy stream drained to completion by the emission.
    Stream(BoxStream<'static, Result<()>>),
}

impl HookOutcome {
    fn into_future(self) -> Option<BoxFuture<'static, Result<()>>> {
        match self {
            HookOutcome::Done => None,
            HookOutcome::Pending(fut) => Some(fut),
            HookOutcome::Stream(stream) => Some(stream.try_for_each(|()| future::ready(Ok(()))).boxed()),
        }
    }
}

type Handler<T> = Arc<dyn Fn(&T) -> Result<HookOutcome> + Send + Sync>;

struct Observers<T> {
    name: Cow<'static, str>,
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Handler<T>)>>,
}

trait Unsubscribe: Send + Sync {
    fn remove(&self, id: u64);
}

impl<T: 'static> Unsubscribe for Observers<T> {
    fn remove(&self, id: u64) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.retain(|(handler_id, _)| *handler_id != id);
        }
    }
}

/// Fan-out/join primitive for lifecycle hooks.
pub struct EventEmitter<T> {
    observers: Arc<Observers<T>>,
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            observers: self.observers.clone(),
        }
    }
}

impl<T> fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("name", &self.observers.name)
            .field("handlers", &self.observers.handlers.lock().map(|h| h.len()).unwrap_or(0))
            .finish()
    }
}

impl<T: 'static> EventEmitter<T> {
    /// `name` identifies the event in logs.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            observers: Arc::new(Observers {
                name: name.into(),
                next_id: AtomicU64::new(0),
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.observers.name
    }

    /// Register a handler that may defer work.
    pub fn subscribe_with<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) -> Result<HookOutcome> + Send + Sync + 'static,
    {
        let id = self.observers.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut handlers) = self.observers.handlers.lock() {
            handlers.push((id, Arc::new(handler)));
        }
        let weak: Weak<dyn Unsubscribe> = Arc::downgrade(&self.observers) as Weak<dyn Unsubscribe>;
        Subscription {
            id,
            observers: weak,
        }
    }

    /// Register a synchronous handler.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe_with(move |value| handler(value).map(|()| HookOutcome::Done))
    }

    /// Register a handler returning a future the emission waits for.
    pub fn subscribe_async<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.subscribe_with(move |value| Ok(HookOutcome::Pending(handler(value).boxed())))
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.observers.handlers.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every handler with `value` and join on their deferred work.
    pub fn emit(&self, value: &T) -> BoxFuture<'static, Result<()>> {
        let snapshot: Vec<Handler<T>> = match self.observers.handlers.lock() {
            Ok(handlers) => handlers.iter().map(|(_, h)| h.clone()).collect(),
            Err(_) => Vec::new(),
        };
        let mut first_sync_error = None;
        let mut pending = Vec::new();
        for handler in snapshot {
            match handler(value) {
                Ok(outcome) => pending.extend(outcome.into_future()),
                Err(err) => {
                    log::debug!("Handler for '{}' failed: {}", self.observers.name, err);
                    if first_sync_error.is_none() {
                        first_sync_error = Some(err);
                    }
                }
            }
        }
        if pending.is_empty() {
            return future::ready(first_sync_error.map_or(Ok(()), Err)).boxed();
        }
        async move {
            let results = future::join_all(pending).await;
            if let Some(err) = first_sync_error {
                return Err(err);
            }
            results.into_iter().collect()
        }
        .boxed()
    }
}

/// Handle to a registered handler.
pub struct Subscription {
    id: u64,
    observers: Weak<dyn Unsubscribe>,
}

impl Subscription {
    /// Remove the handler from future emissions. Emissions already in
    /// flight are unaffected.
    pub fn unsubscribe(self) {
        if let Some(observers) = self.observers.upgrade() {
            observers.remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Subscriptions released together when dropped.
#[derive(Debug, Default)]
pub struct ScopedSubscriptions {
    subscriptions: Vec<Subscription>,
}

impl ScopedSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl Drop for ScopedSubscriptions {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}
