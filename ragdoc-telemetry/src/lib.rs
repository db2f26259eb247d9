//! Logging setup for ragdoc binaries.
//!
//! [`init_telemetry`] installs a global `tracing` subscriber that writes to
//! stderr. The filter comes from `RUST_LOG` (default `info`) and the output
//! format from `RAGDOC_LOG_FORMAT` (`pretty`, the default, or `json`).
//!
//! [`memory`] provides a layer that records events in memory, for tests that
//! assert on what was logged.

pub mod memory;

use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::{SubscriberInitExt as _, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "RAGDOC_LOG_FORMAT";

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}', expected pretty or json")),
        }
    }
}

impl LogFormat {
    /// Read the format from [`LOG_FORMAT_ENV`], falling back to [`LogFormat::Pretty`].
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV).ok().and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

/// Build the filter from `RUST_LOG`, or `default_directive` if it is unset or invalid.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber with the format from the environment.
///
/// `service_name` is attached to the startup event.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(service_name: &str) -> Result<(), TryInitError> {
    init_with_format(service_name, LogFormat::from_env())
}

/// Install the global subscriber with an explicit format.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_with_format(service_name: &str, format: LogFormat) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter("info"));
    match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_writer(std::io::stderr)).try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .try_init()?,
    }
    tracing::debug!(service = service_name, ?format, "telemetry initialised");
    Ok(())
}
