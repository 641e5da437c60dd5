//! Tracing Subscriber Setup
//!
//! Installs a `fmt` subscriber filtered by `RUST_LOG`. Only the binary calls
//! this; embedding applications bring their own subscriber or pass a
//! [`tracing::Dispatch`] through the client configuration.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `masto_stream=info`)
//! - `LOG_FORMAT`: `compact` for single-line output (default: full)

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Default filter directive when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVE: &str = "masto_stream=info";

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub default_directive: String,
    /// Single-line output.
    pub compact: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            compact: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let compact = std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("compact"))
            .unwrap_or(false);

        Self {
            compact,
            ..Self::default()
        }
    }
}

/// Install the global subscriber with configuration from environment.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init() -> Result<(), TryInitError> {
    init_with_config(&TelemetryConfig::from_env())
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_with_config(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_directive));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.compact {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.compact())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.default_directive, DEFAULT_DIRECTIVE);
        assert!(!config.compact);
    }

    #[test]
    fn second_init_fails_without_panicking() {
        let config = TelemetryConfig::default();
        let _ = init_with_config(&config);
        assert!(init_with_config(&config).is_err());
    }
}
