//! REST Module
//!
//! Request/response side of the client: the HTTP gateway, endpoint guards,
//! Link-header pagination and the repositories built on them.

mod error;
mod gateway;
mod guards;
mod paginator;

/// Entities returned by REST endpoints.
pub mod entities;

/// Instance endpoints.
pub mod instance;

/// Timeline endpoints.
pub mod timelines;

pub use error::RestError;
pub use gateway::{RestGateway, RetryConfig};
pub use guards::{Availability, parse_server_version, require_authentication, require_version};
pub use instance::InstanceRepository;
pub use paginator::Paginator;
pub use timelines::{TimelineParams, TimelinesRepository};
