#![forbid(unsafe_code)]

//! Error taxonomy for the notification bus.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Dead handler handle | `Weak` with no referent passed to subscribe | `InvalidArgument` |
//! | Inline handler panic | Handler panics on the delivery context | Unwinds through `notify`, not wrapped |
//! | Posted handler panic | Handler panics on a runtime delivery thread | `HandlerFailure`, reported by the runtime |
//! | Bad environment value | Unparsable configuration variable | `InvalidConfig` |
//!
//! Reclaimed handlers are not an error: they are pruned silently.

/// Errors produced by the bus and its runtime delivery contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// An argument could not be accepted (the Rust analogue of a null handler).
    InvalidArgument { name: &'static str, reason: String },
    /// A posted delivery panicked on its delivery context.
    HandlerFailure { message: String },
    /// A configuration value could not be parsed or is out of range.
    InvalidConfig { key: String, value: String },
}

impl BusError {
    /// Convenience constructor for [`BusError::InvalidArgument`].
    #[must_use]
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Build a [`BusError::HandlerFailure`] from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::HandlerFailure { message }
    }
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
            Self::HandlerFailure { message } => write!(f, "handler failed: {message}"),
            Self::InvalidConfig { key, value } => {
                write!(f, "invalid configuration value for {key}: '{value}'")
            }
        }
    }
}

impl std::error::Error for BusError {}

/// Result alias used across the workspace.
pub type BusResult<T> = Result<T, BusError>;
