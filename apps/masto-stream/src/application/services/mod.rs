//! Application Services
//!
//! Orchestration on top of the ports: turning actions into frames,
//! reference counting subscriptions, routing inbound events and the
//! client facade tying them together.

/// Typed action to frame dispatch.
pub mod dispatcher;

/// Reference-counted subscription router.
pub mod counter;

/// Consumer-facing subscription handle.
pub mod subscription;

/// Streaming client facade.
pub mod client;

pub use client::StreamingClient;
pub use counter::{Delivery, SubscriptionCounter};
pub use dispatcher::ConnectionActionDispatcher;
pub use subscription::{Subscription, SubscriptionHandle};
