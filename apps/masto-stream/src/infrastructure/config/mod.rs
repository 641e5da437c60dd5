//! Configuration Module
//!
//! Configuration loading for the streaming client and REST gateway.

mod settings;

pub use settings::{ClientConfig, ConfigError, Credential, HeartbeatSettings};
