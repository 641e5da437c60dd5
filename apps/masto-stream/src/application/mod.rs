//! Application Layer - Ports and streaming services.
//!
//! Contains the port definitions implemented by infrastructure adapters
//! and the services built on them: action dispatch, subscription counting
//! and routing, and the consumer-facing subscription.

/// Port interfaces (traits) for connector, serializer and dispatcher.
pub mod ports;

/// Streaming services.
pub mod services;
