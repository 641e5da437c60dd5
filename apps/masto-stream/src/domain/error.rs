//! Error Taxonomy
//!
//! Errors of the streaming core. The enum is `Clone` so that a single
//! connection loss can be handed to every live subscription.

use super::channel::ConnectionState;

/// Errors raised by the connector, dispatcher, serializer and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The transport could not be established or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// A frame was sent while the connection was not open.
    #[error("not connected (connection is {state})")]
    NotConnected {
        /// State at the time of the send.
        state: ConnectionState,
    },

    /// An action of an unknown kind, or a malformed action, was dispatched.
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    /// An inbound frame could not be decoded.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// An outbound action could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),
}

impl ClientError {
    /// Check if this error means the connection was not open.
    #[must_use]
    pub const fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected { .. })
    }
}
