#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Masto Stream - Multiplexed Streaming Client
//!
//! Client for a Mastodon-compatible server. One physical WebSocket
//! connection is shared by any number of logical channel subscriptions;
//! each subscription is an independent, lazily consumed sequence of events.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and bookkeeping
//!   - `channel`: tags, frames, inbound events, connection state
//!   - `action`: outbound actions and their validation
//!   - `subscription`: reference-count table
//!
//! - **Application**: Port definitions and services
//!   - `ports`: connector, serializer and dispatcher interfaces
//!   - `services`: dispatcher, subscription counter, `Subscription`,
//!     `StreamingClient`
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `ws`: WebSocket connector
//!   - `codec`: JSON serializer
//!   - `rest`: REST gateway, guards, pagination, repositories
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                        ┌──────────────────────┐   Subscription("public")
//! WebSocket ──frames──►  │ SubscriptionCounter  │──► Subscription("public")
//!     ▲                  │  (tag → subscribers) │──► Subscription("list:42")
//!     │                  └──────────┬───────────┘
//!     └──── subscribe/unsubscribe ──┘  (first attach / last detach only)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no I/O.
pub mod domain;

/// Application layer - Ports and streaming services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::action::{ActionKind, HttpMethod, OutboundAction, RawAction};
pub use domain::channel::{
    Channel, ChannelTag, ConnectionState, EventPayload, Frame, InboundEvent,
};
pub use domain::error::ClientError;
pub use domain::subscription::SubscriptionStats;

// Ports
pub use application::ports::{ActionDispatcher, Connector, ConnectorEvent, Serializer};

// Services
pub use application::services::{
    ConnectionActionDispatcher, StreamingClient, Subscription, SubscriptionHandle,
};

// Adapters
pub use infrastructure::codec::JsonSerializer;
pub use infrastructure::ws::{ConnectorConfig, WebSocketConnector};

// REST
pub use infrastructure::rest::{
    InstanceRepository, Paginator, RestError, RestGateway, TimelineParams, TimelinesRepository,
};

// Configuration
pub use infrastructure::config::{ClientConfig, ConfigError, Credential, HeartbeatSettings};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, init as init_telemetry};
