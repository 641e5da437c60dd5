//! Domain Layer - Core streaming types with no I/O.
//!
//! Channel tags, frames, decoded events, outbound actions, the
//! reference-count table and the error taxonomy. Everything here is pure
//! Rust with serialization support.

/// Channel tags, frames, inbound events and connection state.
pub mod channel;

/// Outbound actions and their validation.
pub mod action;

/// Subscription reference counting.
pub mod subscription;

/// Error taxonomy of the streaming core.
pub mod error;
