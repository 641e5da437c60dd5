//! REST error types.

use thiserror::Error;

/// Errors from the REST gateway.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RestError {
    /// Request could not be sent or the response could not be read.
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the server.
        message: String,
    },

    /// Endpoint needs an access token, or the token was rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Endpoint does not exist on the server's version.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Response body did not match the expected type.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// Action cannot be executed over REST.
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),
}

impl RestError {
    /// Check if a later attempt could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => matches!(*status, 408 | 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}
