#![forbid(unsafe_code)]

//! Delivery contexts and notification sources built on `wbus-core`.
//!
//! # Delivery contexts
//!
//! - [`DispatcherThread`]: a dedicated named thread; posted deliveries run
//!   there in order, panics are caught and reported through
//!   [`DispatcherThread::check_error`].
//! - [`DispatchQueue`]: a queue pumped by the thread that created it, for
//!   applications with their own main loop.
//!
//! # Notification sources
//!
//! - [`DelegateCommand`] / [`CommandBase`]: commands raising
//!   [`CanExecuteChanged`].
//! - [`PropertyNotifier`]: named [`PropertyChanged`] notifications.
//!
//! # Ambient
//!
//! [`DispatcherConfig`] loads dispatcher settings from `WBUS_DISPATCH_*`
//! variables; [`init_logging`] installs a `tracing-subscriber` formatter
//! filtered by `WBUS_LOG`.

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod property;
pub mod queue;
pub mod source;

pub use command::{CanExecuteChanged, CanExecuteHandler, Command, CommandBase, DelegateCommand};
pub use config::DispatcherConfig;
pub use dispatcher::{DispatcherHandle, DispatcherThread};
pub use logging::{LOG_ENV, LogFormat, LogInitError, init_logging};
pub use property::{PropertyChanged, PropertyChangedHandler, PropertyNotifier};
pub use queue::{DispatchQueue, PumpReport, QueueHandle};
pub use source::SourceId;
