#![forbid(unsafe_code)]

//! Structured logging setup.
//!
//! The crates emit `tracing` events; this module installs a
//! `tracing-subscriber` formatter for binaries that do not bring their own.
//! The filter comes from the `WBUS_LOG` environment variable using the usual
//! `EnvFilter` directive syntax (e.g. `wbus_core=trace,info`), defaulting to
//! `info`.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "WBUS_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Error returned when a global subscriber is already installed.
pub type LogInitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Output format for [`init_logging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-field lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Build the filter from `WBUS_LOG`, falling back to `info`.
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install a global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber has already been set.
pub fn init_logging(format: LogFormat) -> Result<(), LogInitError> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
    match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}
