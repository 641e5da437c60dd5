//! Port Interfaces
//!
//! Defines the interfaces (ports) between the streaming services and the
//! adapters that implement them, following the Hexagonal Architecture
//! pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Connector`: owns the single physical connection
//! - `Serializer`: encodes actions and decodes inbound frames
//! - `ActionDispatcher`: turns typed actions into sent frames

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::action::OutboundAction;
use crate::domain::channel::{ConnectionState, Frame, InboundEvent};
use crate::domain::error::ClientError;

// =============================================================================
// Connector
// =============================================================================

/// Notifications emitted by a connector to its listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// A raw inbound frame arrived.
    Frame(Frame),
    /// The transport failed; emitted right before `StateChanged(Closed)`.
    Error(ClientError),
}

/// Receiving half of a connector listener. Dropping it unregisters.
pub type ConnectorEvents = mpsc::UnboundedReceiver<ConnectorEvent>;

/// Owner of the single physical connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish the connection unless it is already open or connecting.
    async fn connect(&self) -> Result<(), ClientError>;

    /// Queue a frame for sending.
    ///
    /// Fails with `NotConnected` unless the connection is open.
    fn send(&self, frame: Frame) -> Result<(), ClientError>;

    /// Close the connection. Subsequent calls are no-ops.
    async fn close(&self);

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Number of transitions to `Closed` so far.
    ///
    /// Every increment is followed by exactly one `StateChanged(Closed)`
    /// event to each listener.
    fn generation(&self) -> u64;

    /// Register a listener for state changes and inbound frames.
    fn listen(&self) -> ConnectorEvents;
}

// =============================================================================
// Serializer
// =============================================================================

/// Pure encoder/decoder of wire payloads.
#[cfg_attr(test, mockall::automock)]
pub trait Serializer: Send + Sync {
    /// Encode an action into a frame.
    fn encode(&self, action: &OutboundAction) -> Result<Frame, ClientError>;

    /// Decode an inbound frame.
    ///
    /// Fails with `MalformedFrame` for invalid JSON or a missing stream tag.
    fn decode(&self, frame: &Frame) -> Result<InboundEvent, ClientError>;
}

// =============================================================================
// Action Dispatcher
// =============================================================================

/// Translator from typed actions to sent frames.
#[cfg_attr(test, mockall::automock)]
pub trait ActionDispatcher: Send + Sync {
    /// Validate, encode and send one action.
    fn dispatch(&self, action: OutboundAction) -> Result<(), ClientError>;
}
