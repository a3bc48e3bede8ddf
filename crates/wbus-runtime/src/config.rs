#![forbid(unsafe_code)]

//! Dispatcher configuration.
//!
//! [`DispatcherConfig`] follows the usual builder shape: a `Default`, a set
//! of `with_*` setters, and an environment loader. The environment loader
//! takes a lookup function so callers (and tests) can supply their own
//! source instead of the process environment.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `WBUS_DISPATCH_THREAD_NAME` | Name of the dispatcher thread | `wbus-dispatch` |
//! | `WBUS_DISPATCH_ERROR_CAPACITY` | Buffered handler failures | `8` |
//! | `WBUS_DISPATCH_DRAIN` | Run queued tasks on shutdown | `true` |

use wbus_core::{BusError, BusResult};

pub const ENV_THREAD_NAME: &str = "WBUS_DISPATCH_THREAD_NAME";
pub const ENV_ERROR_CAPACITY: &str = "WBUS_DISPATCH_ERROR_CAPACITY";
pub const ENV_DRAIN: &str = "WBUS_DISPATCH_DRAIN";

const DEFAULT_THREAD_NAME: &str = "wbus-dispatch";
const DEFAULT_ERROR_CAPACITY: usize = 8;

/// Configuration for a [`DispatcherThread`](crate::DispatcherThread).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Name given to the spawned delivery thread.
    pub thread_name: String,
    /// How many handler failures are buffered before new ones are dropped.
    pub error_capacity: usize,
    /// Whether tasks queued before shutdown still run.
    pub drain_on_shutdown: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            error_capacity: DEFAULT_ERROR_CAPACITY,
            drain_on_shutdown: true,
        }
    }
}

impl DispatcherConfig {
    /// Set the delivery thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the failure buffer size.
    #[must_use]
    pub fn with_error_capacity(mut self, capacity: usize) -> Self {
        self.error_capacity = capacity;
        self
    }

    /// Set shutdown drain behavior.
    #[must_use]
    pub fn with_drain_on_shutdown(mut self, drain: bool) -> Self {
        self.drain_on_shutdown = drain;
        self
    }

    /// Load from the process environment, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] for unparsable values.
    pub fn from_env() -> BusResult<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Load using a custom environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] for unparsable values.
    pub fn from_env_with<F>(get_env: F) -> BusResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(name) = get_env(ENV_THREAD_NAME) {
            config.thread_name = name;
        }
        if let Some(raw) = get_env(ENV_ERROR_CAPACITY) {
            config.error_capacity = raw
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_ERROR_CAPACITY, &raw))?;
        }
        if let Some(raw) = get_env(ENV_DRAIN) {
            config.drain_on_shutdown = parse_flag(&raw).ok_or_else(|| invalid(ENV_DRAIN, &raw))?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the dispatcher relies on.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] for an empty thread name or a zero
    /// error capacity.
    pub fn validate(&self) -> BusResult<()> {
        if self.thread_name.trim().is_empty() {
            return Err(invalid(ENV_THREAD_NAME, &self.thread_name));
        }
        if self.error_capacity == 0 {
            return Err(invalid(ENV_ERROR_CAPACITY, "0"));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(key: &str, value: &str) -> BusError {
    BusError::InvalidConfig {
        key: key.to_string(),
        value: value.to_string(),
    }
}
