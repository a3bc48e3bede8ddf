#![forbid(unsafe_code)]

//! Delivery context pumped by its owning thread.
//!
//! [`DispatchQueue`] suits applications that already have a main loop: the
//! thread that creates the queue becomes the delivery context, other threads
//! post into it through a [`QueueHandle`], and the owner drains posted work
//! with [`DispatchQueue::run_pending`] once per loop turn.
//!
//! The queue itself is `!Send`, so only the owning thread can pump it.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Task panic | Posted handler panics | Caught, reported in [`PumpReport::failures`], pumping continues |
//! | Queue dropped | Owner dropped the queue | Later posts are dropped with a warning |
//! | Self-reposting task | Task posts again while pumping | `run_pending` keeps going; use `run_at_most` to bound a turn |

use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::{self, ThreadId};

use wbus_core::{BusError, DeliveryContext, Task};

/// Cloneable, thread-safe posting side of a [`DispatchQueue`].
#[derive(Clone)]
pub struct QueueHandle {
    sender: mpsc::Sender<Task>,
    owner: ThreadId,
    pending: Arc<AtomicUsize>,
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("owner", &self.owner)
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .finish()
    }
}

impl QueueHandle {
    /// Id of the owning thread.
    #[must_use]
    pub fn owner(&self) -> ThreadId {
        self.owner
    }
}

impl DeliveryContext for QueueHandle {
    fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn post(&self, task: Task) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(task).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!("dispatch queue dropped; discarding posted task");
        }
    }
}

/// Outcome of one pump turn.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PumpReport {
    /// Tasks executed, including those that panicked.
    pub executed: usize,
    /// Failures from panicking tasks, in execution order.
    pub failures: Vec<BusError>,
}

impl PumpReport {
    /// Whether every executed task completed normally.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A task queue whose delivery context is the thread that created it.
pub struct DispatchQueue {
    handle: QueueHandle,
    receiver: mpsc::Receiver<Task>,
    /// Pins the queue to its owner thread.
    _not_send: PhantomData<*const ()>,
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl DispatchQueue {
    /// Create a queue owned by the calling thread.
    #[must_use]
    pub fn for_current_thread() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            handle: QueueHandle {
                sender,
                owner: thread::current().id(),
                pending: Arc::new(AtomicUsize::new(0)),
            },
            receiver,
            _not_send: PhantomData,
        }
    }

    /// A cloneable posting handle.
    #[must_use]
    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// The handle as a shareable trait object, ready for a bus constructor.
    #[must_use]
    pub fn context(&self) -> Arc<dyn DeliveryContext> {
        Arc::new(self.handle.clone())
    }

    /// Approximate number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.handle.pending.load(Ordering::SeqCst)
    }

    /// Run queued tasks until the queue is empty.
    ///
    /// Tasks posted by running tasks are picked up in the same turn.
    pub fn run_pending(&self) -> PumpReport {
        self.run_at_most(usize::MAX)
    }

    /// Run at most `limit` queued tasks.
    pub fn run_at_most(&self, limit: usize) -> PumpReport {
        let mut report = PumpReport::default();
        while report.executed < limit {
            let Ok(task) = self.receiver.try_recv() else {
                break;
            };
            self.handle.pending.fetch_sub(1, Ordering::SeqCst);
            report.executed += 1;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                let err = BusError::from_panic(payload.as_ref());
                tracing::error!(error = %err, "queued delivery panicked");
                report.failures.push(err);
            }
        }
        if report.executed > 0 {
            tracing::trace!(
                executed = report.executed,
                failed = report.failures.len(),
                "dispatch queue pumped"
            );
        }
        report
    }
}
