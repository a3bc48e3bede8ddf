#![forbid(unsafe_code)]

//! Delivery-context capability.
//!
//! A [`DeliveryContext`] names the single execution context (typically a UI
//! or main thread) on which notification handlers must run. The bus asks it
//! two questions and nothing else:
//!
//! - [`is_current`](DeliveryContext::is_current): is the calling thread the
//!   delivery context? No side effects.
//! - [`post`](DeliveryContext::post): run this task on the delivery context
//!   later. Must not block waiting for the task.
//!
//! Contexts are injected at bus construction as `Arc<dyn DeliveryContext>`.
//! Concrete thread-backed contexts live in `wbus-runtime`.

/// A zero-argument unit of work posted to a delivery context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Capability pair used by the bus to honour thread affinity.
pub trait DeliveryContext: Send + Sync {
    /// Whether the calling thread is the delivery context.
    fn is_current(&self) -> bool;

    /// Enqueue `task` to run on the delivery context (fire-and-forget).
    fn post(&self, task: Task);
}

/// A context that is current everywhere.
///
/// Every delivery runs inline on the notifying thread. Suitable for
/// single-threaded consumers and for tests that do not exercise affinity.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContext;

impl InlineContext {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DeliveryContext for InlineContext {
    fn is_current(&self) -> bool {
        true
    }

    fn post(&self, task: Task) {
        task();
    }
}
