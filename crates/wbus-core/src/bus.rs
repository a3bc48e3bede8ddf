#![forbid(unsafe_code)]

//! Weak-subscriber notification bus with delivery-context affinity.
//!
//! # Design
//!
//! [`WeakNotificationBus<S, A>`] keeps an ordered list of `Weak` handler
//! references behind a `Mutex`. The list is allocated on first subscription.
//! A notification pass:
//!
//! 1. Locks the list and walks it once in reverse index order. Entries whose
//!    referent is gone are removed in place; live ones are upgraded into a
//!    snapshot.
//! 2. Releases the lock and reverses the snapshot, so delivery follows
//!    subscription order.
//! 3. For each snapshot entry: runs it inline when the caller is on the
//!    delivery context, otherwise posts it there and moves on.
//!
//! # Performance
//!
//! | Operation       | Complexity                          |
//! |-----------------|-------------------------------------|
//! | `subscribe()`   | O(1) amortized                      |
//! | `unsubscribe()` | O(S) where S = entries              |
//! | `notify()`      | O(S) scan + one call per live entry |
//!
//! # Failure Modes
//!
//! - **Handler panic (inline)**: unwinds through `notify`. Handlers later in
//!   the snapshot are not invoked. The bus lock is not held at that point, so
//!   the bus stays usable.
//! - **Handler panic (posted)**: handled by the delivery context; it does not
//!   affect the notifying thread or other posted deliveries.
//! - **Forgotten strong reference**: if the subscriber drops its last `Arc`,
//!   the handler silently stops receiving notifications. This is the point of
//!   the design, not a bug.
//! - **Posted delivery keeps handler alive**: a task waiting on the delivery
//!   context owns a strong reference until it runs.

use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::context::DeliveryContext;
use crate::error::{BusError, BusResult};

/// A notification handler: `(sender, args) -> ()`.
pub type Handler<S, A> = Arc<dyn Fn(&S, &A) + Send + Sync>;

/// The non-owning form stored by the bus.
pub type WeakHandler<S, A> = Weak<dyn Fn(&S, &A) + Send + Sync>;

/// Many-to-one change notification over non-owning handler references.
///
/// # Invariants
///
/// 1. The bus never owns a handler; only subscribers do.
/// 2. Dead entries are pruned lazily by `notify` and `unsubscribe`, never on a
///    timer and never by `subscribe`.
/// 3. Within one `notify`, handlers are delivered in subscription order.
/// 4. Subscription changes made by handlers during delivery do not affect the
///    delivery already in progress.
pub struct WeakNotificationBus<S, A> {
    /// `None` until the first subscription.
    handlers: Mutex<Option<Vec<WeakHandler<S, A>>>>,
    capacity_hint: usize,
    context: Arc<dyn DeliveryContext>,
}

impl<S, A> std::fmt::Debug for WeakNotificationBus<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.lock();
        f.debug_struct("WeakNotificationBus")
            .field("allocated", &handlers.is_some())
            .field("entries", &handlers.as_ref().map_or(0, Vec::len))
            .field("capacity_hint", &self.capacity_hint)
            .finish_non_exhaustive()
    }
}

impl<S, A> WeakNotificationBus<S, A>
where
    S: 'static,
    A: 'static,
{
    /// Create a bus delivering on `context`.
    #[must_use]
    pub fn new(context: Arc<dyn DeliveryContext>) -> Self {
        Self::with_capacity(context, 0)
    }

    /// Create a bus with an initial capacity hint for the subscription list.
    ///
    /// The hint only sizes the first allocation; it has no semantic effect.
    #[must_use]
    pub fn with_capacity(context: Arc<dyn DeliveryContext>, capacity: usize) -> Self {
        Self {
            handlers: Mutex::new(None),
            capacity_hint: capacity,
            context,
        }
    }

    /// The delivery context this bus honours.
    #[must_use]
    pub fn context(&self) -> &Arc<dyn DeliveryContext> {
        &self.context
    }

    /// Subscribe `handler` without taking ownership of it.
    ///
    /// The caller must keep its own `Arc` alive for as long as it wants to
    /// receive notifications. Subscribing the same handler twice delivers it
    /// twice per notification.
    pub fn subscribe(&self, handler: &Handler<S, A>) {
        self.push(Arc::downgrade(handler));
    }

    /// Subscribe an already non-owning handle.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidArgument`] if the handle's referent has
    /// already been dropped (there is nothing left to subscribe).
    pub fn try_subscribe_weak(&self, handler: WeakHandler<S, A>) -> BusResult<()> {
        if handler.strong_count() == 0 {
            return Err(BusError::invalid_argument(
                "handler",
                "referent already dropped",
            ));
        }
        self.push(handler);
        Ok(())
    }

    /// Subscribe a closure and return the guard that owns it.
    ///
    /// Dropping the [`Subscription`] makes the entry stale; it is pruned on
    /// the next `notify` or `unsubscribe`.
    pub fn subscribe_owned(
        &self,
        handler: impl Fn(&S, &A) + Send + Sync + 'static,
    ) -> Subscription {
        let strong: Handler<S, A> = Arc::new(handler);
        self.subscribe(&strong);
        // `Arc<dyn Fn(..)>` cannot coerce to `dyn Any` directly, so box the Arc.
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Remove every entry referring to `handler`, pruning dead entries too.
    ///
    /// A no-op when `handler` is not subscribed or nothing was ever
    /// subscribed.
    pub fn unsubscribe(&self, handler: &Handler<S, A>) {
        let target = Arc::as_ptr(handler);
        let mut guard = self.lock();
        let Some(handlers) = guard.as_mut() else {
            return;
        };
        let before = handlers.len();
        // Compare without upgrading: a handler must never be dropped under the lock.
        handlers.retain(|weak| weak.strong_count() > 0 && !ptr::addr_eq(weak.as_ptr(), target));
        let removed = before - handlers.len();
        if removed > 0 {
            tracing::trace!(removed, remaining = handlers.len(), "bus unsubscribe");
        }
    }

    /// Number of entries in the list, including dead ones not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().as_ref().map_or(0, Vec::len)
    }

    /// Whether the subscription list has been allocated.
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.lock().is_some()
    }

    /// Deliver `(sender, args)` to every live handler.
    ///
    /// Handlers run inline when the caller is on the delivery context and are
    /// posted to it otherwise; posting does not wait for completion.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from any handler invoked inline. Handlers after the
    /// panicking one in the snapshot are not invoked.
    pub fn notify(&self, sender: S, args: A)
    where
        S: Clone + Send,
        A: Clone + Send,
    {
        let callees = self.snapshot();
        let mut posted = 0usize;
        for handler in callees {
            if self.context.is_current() {
                handler(&sender, &args);
            } else {
                let sender = sender.clone();
                let args = args.clone();
                self.context.post(Box::new(move || handler(&sender, &args)));
                posted += 1;
            }
        }
        if posted > 0 {
            tracing::trace!(posted, "bus posted deliveries to delivery context");
        }
    }

    fn push(&self, handler: WeakHandler<S, A>) {
        let mut guard = self.lock();
        let capacity = self.capacity_hint;
        guard
            .get_or_insert_with(|| Vec::with_capacity(capacity))
            .push(handler);
    }

    /// Prune dead entries and collect live handlers, in subscription order.
    fn snapshot(&self) -> Vec<Handler<S, A>> {
        let mut guard = self.lock();
        let Some(handlers) = guard.as_mut() else {
            return Vec::new();
        };

        let mut callees = Vec::with_capacity(handlers.len());
        let mut pruned = 0usize;
        // Reverse walk so in-place removal never shifts an unvisited index.
        for i in (0..handlers.len()).rev() {
            match handlers[i].upgrade() {
                Some(handler) => callees.push(handler),
                None => {
                    handlers.remove(i);
                    pruned += 1;
                }
            }
        }
        if pruned > 0 {
            tracing::trace!(pruned, live = callees.len(), "bus pruned dead handlers");
        }
        drop(guard);

        callees.reverse();
        callees
    }
}

impl<S, A> WeakNotificationBus<S, A> {
    fn lock(&self) -> MutexGuard<'_, Option<Vec<WeakHandler<S, A>>>> {
        self.handlers.lock().expect("notification bus lock poisoned")
    }
}

/// RAII guard for a handler created by
/// [`WeakNotificationBus::subscribe_owned`].
///
/// Holds the only strong reference to the handler. Once dropped, the bus's
/// `Weak` entry fails to upgrade and is pruned on the next pass.
pub struct Subscription {
    /// Type-erased `Arc<dyn Fn(&S, &A)>`.
    _guard: Box<dyn std::any::Any + Send + Sync>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
