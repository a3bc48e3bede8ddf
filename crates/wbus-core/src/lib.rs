#![forbid(unsafe_code)]

//! Weak-subscriber change notification.
//!
//! This crate provides the notification primitive shared by the rest of the
//! workspace:
//!
//! - [`WeakNotificationBus`]: a many-to-one change notification list that
//!   holds its handlers through `Weak` references and delivers on a
//!   designated [`DeliveryContext`].
//! - [`DeliveryContext`]: the injected capability pair "am I on the delivery
//!   context?" / "post this task to it".
//! - [`BusError`]: the error taxonomy.
//!
//! # Architecture
//!
//! Subscribing never keeps a handler alive. The subscriber owns the `Arc`
//! (directly, or through a [`Subscription`] guard); the bus only keeps a
//! `Weak`. Dead entries are pruned lazily during `notify` and `unsubscribe`.
//!
//! Delivery takes a snapshot of the live handlers under the bus lock and then
//! invokes them with the lock released, so handlers may freely subscribe or
//! unsubscribe while a notification is in flight.
//!
//! # Invariants
//!
//! 1. The bus never holds a strong reference to a handler between calls.
//! 2. Within one `notify`, handlers run in subscription order.
//! 3. A handler dropped by its owner is never invoked by a later `notify`.
//! 4. Handler panics during inline delivery unwind through `notify`
//!    unchanged.

pub mod bus;
pub mod context;
pub mod error;

pub use bus::{Handler, Subscription, WeakHandler, WeakNotificationBus};
pub use context::{DeliveryContext, InlineContext, Task};
pub use error::{BusError, BusResult};
