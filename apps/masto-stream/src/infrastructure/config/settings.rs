//! Client Configuration Settings
//!
//! Configuration types for the streaming client, built in code or loaded
//! from environment variables.

use std::time::Duration;

use tracing::Dispatch;

/// Bearer token used for the WebSocket upgrade and REST requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
}

impl Credential {
    /// Create a new credential.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Get the access token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value of the `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Keepalive settings of the streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSettings {
    /// Interval between pings, `None` disables keepalive.
    pub ping_interval: Option<Duration>,
    /// Time the server has to answer a ping before the connection is
    /// considered lost. Measured from the first unanswered ping and checked
    /// on each ping tick, so it is independent of `ping_interval`.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            ping_interval: Some(Duration::from_secs(30)),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

impl HeartbeatSettings {
    /// Settings with keepalive turned off.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            ping_interval: None,
            pong_timeout: Duration::from_secs(60),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Streaming endpoint, e.g. `wss://example.social/api/v1/streaming`.
    pub endpoint: String,
    /// Base URL of the REST API, e.g. `https://example.social`.
    pub rest_url: Option<String>,
    /// Access token.
    pub credential: Option<Credential>,
    /// Keepalive settings.
    pub heartbeat: HeartbeatSettings,
    /// Sink for connection logs; the global subscriber when `None`.
    pub logger: Option<Dispatch>,
}

impl ClientConfig {
    /// Configuration for `endpoint` with defaults for everything else.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            rest_url: None,
            credential: None,
            heartbeat: HeartbeatSettings::default(),
            logger: None,
        }
    }

    /// Set the REST base URL.
    #[must_use]
    pub fn with_rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url = Some(url.into());
        self
    }

    /// Set the access token.
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Set the keepalive settings.
    #[must_use]
    pub const fn with_heartbeat(mut self, heartbeat: HeartbeatSettings) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Route connection logs to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Create configuration from environment variables.
    ///
    /// - `MASTO_STREAMING_URL` (required)
    /// - `MASTO_URL`
    /// - `MASTO_ACCESS_TOKEN`
    /// - `MASTO_PING_INTERVAL_SECS` (0 disables keepalive)
    /// - `MASTO_PONG_TIMEOUT_SECS`
    ///
    /// # Errors
    ///
    /// Returns an error if the streaming URL is missing, empty or not a
    /// WebSocket URL, or if the REST URL is not an HTTP URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let endpoint = lookup("MASTO_STREAMING_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("MASTO_STREAMING_URL".to_string()))?;

        if endpoint.is_empty() {
            return Err(ConfigError::EmptyValue("MASTO_STREAMING_URL".to_string()));
        }

        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "MASTO_STREAMING_URL".to_string(),
                reason: "expected a ws:// or wss:// URL".to_string(),
            });
        }

        let rest_url = lookup("MASTO_URL").filter(|v| !v.is_empty());
        if let Some(url) = &rest_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(ConfigError::InvalidValue {
                key: "MASTO_URL".to_string(),
                reason: "expected an http:// or https:// URL".to_string(),
            });
        }

        let credential = lookup("MASTO_ACCESS_TOKEN")
            .filter(|v| !v.is_empty())
            .map(Credential::new);

        let defaults = HeartbeatSettings::default();
        let ping_interval = match parse_u64(&lookup, "MASTO_PING_INTERVAL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.ping_interval,
        };
        let pong_timeout = match parse_u64(&lookup, "MASTO_PONG_TIMEOUT_SECS") {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "MASTO_PONG_TIMEOUT_SECS".to_string(),
                    reason: "must be at least one second".to_string(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.pong_timeout,
        };

        Ok(Self {
            endpoint,
            rest_url,
            credential,
            heartbeat: HeartbeatSettings {
                ping_interval,
                pong_timeout,
            },
            logger: None,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("environment variable {key} is invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    lookup(key).and_then(|v| v.parse().ok())
}
