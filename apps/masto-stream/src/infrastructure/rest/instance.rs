//! Instance endpoints.

use super::entities::{Activity, Instance, Language, TranslationLanguages};
use super::error::RestError;
use super::gateway::RestGateway;
use super::guards::{Availability, parse_server_version, require_version};
use super::paginator::Paginator;

/// Server information endpoints.
#[derive(Debug, Clone)]
pub struct InstanceRepository {
    gateway: RestGateway,
}

impl InstanceRepository {
    /// Create a repository over `gateway`.
    #[must_use]
    pub const fn new(gateway: RestGateway) -> Self {
        Self { gateway }
    }

    /// Information about the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn fetch(&self) -> Result<Instance, RestError> {
        self.gateway.get("/api/v1/instance").await
    }

    /// Fetch the server and return a gateway that knows its version.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn negotiate(&self) -> Result<RestGateway, RestError> {
        let instance = self.fetch().await?;
        let gateway = self.gateway.clone();

        Ok(match parse_server_version(&instance.version) {
            Some(version) => {
                tracing::info!(version = %version, "Server version negotiated");
                gateway.with_version(version)
            }
            None => {
                tracing::warn!(version = %instance.version, "Unrecognised server version");
                gateway
            }
        })
    }

    /// Domains this server is aware of.
    #[must_use]
    pub fn peers(&self) -> Paginator<String> {
        Paginator::new(self.gateway.clone(), "/api/v1/instance/peers", None)
    }

    /// Activity over the last three months, binned weekly.
    #[must_use]
    pub fn activity(&self) -> Paginator<Activity> {
        Paginator::new(self.gateway.clone(), "/api/v1/instance/activity", None)
    }

    /// Languages supported by the server.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` before version 4.2.0, otherwise request errors.
    pub async fn languages(&self) -> Result<Vec<Language>, RestError> {
        require_version(
            self.gateway.version(),
            &Availability::since(4, 2, 0),
            "instance.languages",
        )?;
        self.gateway.get("/api/v1/instance/languages").await
    }

    /// Language pairs the server can translate between.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` before version 4.2.0, otherwise request errors.
    pub async fn translation_languages(&self) -> Result<TranslationLanguages, RestError> {
        require_version(
            self.gateway.version(),
            &Availability::since(4, 2, 0),
            "instance.translation_languages",
        )?;
        self.gateway
            .get("/api/v1/instance/translation_languages")
            .await
    }
}
