//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the port interfaces defined in the
//! application layer, plus configuration and observability.

/// JSON wire codec.
pub mod codec;

/// WebSocket connector.
pub mod ws;

/// REST gateway and repositories.
pub mod rest;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber setup.
pub mod telemetry;
