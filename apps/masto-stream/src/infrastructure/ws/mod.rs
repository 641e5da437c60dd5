//! WebSocket transport for the streaming endpoint.

mod connector;

pub use connector::{ConnectorConfig, WebSocketConnector};
