#![forbid(unsafe_code)]

//! Commands with weakly-subscribed `can_execute` change notification.
//!
//! A command pairs an action with a predicate saying whether the action is
//! currently allowed. Views subscribe to [`CanExecuteChanged`] to refresh
//! their enabled state; the subscription never keeps the view alive.
//!
//! Most commands have one or two listeners, so the underlying bus is created
//! with a capacity hint of 2.

use std::sync::Arc;

use wbus_core::{BusError, BusResult, DeliveryContext, Handler, Subscription, WeakNotificationBus};

use crate::source::SourceId;

/// Argument delivered when a command's executability may have changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanExecuteChanged;

/// Handler for [`CanExecuteChanged`].
pub type CanExecuteHandler = Handler<SourceId, CanExecuteChanged>;

const LISTENER_CAPACITY: usize = 2;

/// An invokable action guarded by a predicate.
pub trait Command<P> {
    /// Whether [`execute`](Self::execute) is currently allowed for `param`.
    fn can_execute(&self, param: &P) -> bool;

    /// Run the action.
    fn execute(&self, param: &P);
}

/// Notification plumbing shared by command implementations.
pub struct CommandBase {
    source: SourceId,
    can_execute_changed: WeakNotificationBus<SourceId, CanExecuteChanged>,
}

impl std::fmt::Debug for CommandBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBase")
            .field("source", &self.source)
            .field("listeners", &self.can_execute_changed.subscriber_count())
            .finish()
    }
}

impl CommandBase {
    #[must_use]
    pub fn new(context: Arc<dyn DeliveryContext>) -> Self {
        Self {
            source: SourceId::next(),
            can_execute_changed: WeakNotificationBus::with_capacity(context, LISTENER_CAPACITY),
        }
    }

    /// Sender id passed to listeners.
    #[must_use]
    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn subscribe_can_execute_changed(&self, handler: &CanExecuteHandler) {
        self.can_execute_changed.subscribe(handler);
    }

    /// Subscribe a closure; the returned guard keeps it alive.
    pub fn on_can_execute_changed(
        &self,
        handler: impl Fn(&SourceId, &CanExecuteChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.can_execute_changed.subscribe_owned(handler)
    }

    pub fn unsubscribe_can_execute_changed(&self, handler: &CanExecuteHandler) {
        self.can_execute_changed.unsubscribe(handler);
    }

    /// Tell listeners to re-query `can_execute`.
    pub fn raise_can_execute_changed(&self) {
        tracing::trace!(source = %self.source, "can_execute changed");
        self.can_execute_changed.notify(self.source, CanExecuteChanged);
    }

    /// Entries currently held, including stale ones not yet pruned.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.can_execute_changed.subscriber_count()
    }
}

type ExecuteFn<P> = Box<dyn Fn(&P) + Send + Sync>;
type CanExecuteFn<P> = Box<dyn Fn(&P) -> bool + Send + Sync>;

/// A command built from closures.
pub struct DelegateCommand<P> {
    base: CommandBase,
    execute: Option<ExecuteFn<P>>,
    can_execute: Option<CanExecuteFn<P>>,
}

impl<P> std::fmt::Debug for DelegateCommand<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateCommand")
            .field("base", &self.base)
            .field("has_execute", &self.execute.is_some())
            .field("has_can_execute", &self.can_execute.is_some())
            .finish()
    }
}

impl<P> DelegateCommand<P> {
    /// A command that is always executable.
    pub fn new(
        context: Arc<dyn DeliveryContext>,
        execute: impl Fn(&P) + Send + Sync + 'static,
    ) -> Self {
        Self {
            base: CommandBase::new(context),
            execute: Some(Box::new(execute)),
            can_execute: None,
        }
    }

    pub fn with_can_execute(
        context: Arc<dyn DeliveryContext>,
        execute: impl Fn(&P) + Send + Sync + 'static,
        can_execute: impl Fn(&P) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            base: CommandBase::new(context),
            execute: Some(Box::new(execute)),
            can_execute: Some(Box::new(can_execute)),
        }
    }

    /// Build from optional parts.
    ///
    /// A missing `execute` makes [`Command::execute`] a no-op; a missing
    /// `can_execute` means always executable.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidArgument`] when both parts are `None`.
    pub fn from_parts(
        context: Arc<dyn DeliveryContext>,
        execute: Option<ExecuteFn<P>>,
        can_execute: Option<CanExecuteFn<P>>,
    ) -> BusResult<Self> {
        if execute.is_none() && can_execute.is_none() {
            return Err(BusError::invalid_argument(
                "execute",
                "a command needs an execute or can_execute delegate",
            ));
        }
        Ok(Self {
            base: CommandBase::new(context),
            execute,
            can_execute,
        })
    }

    /// Notification plumbing for this command.
    #[must_use]
    pub fn base(&self) -> &CommandBase {
        &self.base
    }

    pub fn raise_can_execute_changed(&self) {
        self.base.raise_can_execute_changed();
    }
}

impl<P> Command<P> for DelegateCommand<P> {
    fn can_execute(&self, param: &P) -> bool {
        self.can_execute.as_ref().is_none_or(|f| f(param))
    }

    fn execute(&self, param: &P) {
        if let Some(f) = &self.execute {
            f(param);
        }
    }
}
