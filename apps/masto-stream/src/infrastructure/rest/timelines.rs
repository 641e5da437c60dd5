//! Timeline endpoints.

use serde::Serialize;
use serde_json::Value;

use super::entities::Status;
use super::error::RestError;
use super::gateway::RestGateway;
use super::guards::require_authentication;
use super::paginator::Paginator;

/// Query parameters shared by timeline endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimelineParams {
    /// Only statuses from this server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<bool>,
    /// Only statuses from other servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<bool>,
    /// Only statuses with media attachments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_media: Option<bool>,
    /// Statuses older than this id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_id: Option<String>,
    /// Statuses newer than this id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since_id: Option<String>,
    /// Statuses immediately newer than this id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_id: Option<String>,
    /// Page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl TimelineParams {
    fn query(&self) -> Option<Value> {
        serde_json::to_value(self)
            .ok()
            .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
    }
}

/// Timeline endpoints.
#[derive(Debug, Clone)]
pub struct TimelinesRepository {
    gateway: RestGateway,
}

impl TimelinesRepository {
    /// Create a repository over `gateway`.
    #[must_use]
    pub const fn new(gateway: RestGateway) -> Self {
        Self { gateway }
    }

    /// Statuses from followed accounts.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` without an access token.
    pub fn home(&self, params: &TimelineParams) -> Result<Paginator<Status>, RestError> {
        require_authentication(self.gateway.credential(), "timelines.home")?;
        Ok(self.paginate("/api/v1/timelines/home", params))
    }

    /// Public statuses.
    #[must_use]
    pub fn public(&self, params: &TimelineParams) -> Paginator<Status> {
        self.paginate("/api/v1/timelines/public", params)
    }

    /// Public statuses containing `hashtag`, given without the `#`.
    #[must_use]
    pub fn tag(&self, hashtag: &str, params: &TimelineParams) -> Paginator<Status> {
        self.paginate(&format!("/api/v1/timelines/tag/{hashtag}"), params)
    }

    /// Statuses from the members of a list.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` without an access token.
    pub fn list(&self, id: &str, params: &TimelineParams) -> Result<Paginator<Status>, RestError> {
        require_authentication(self.gateway.credential(), "timelines.list")?;
        Ok(self.paginate(&format!("/api/v1/timelines/list/{id}"), params))
    }

    fn paginate(&self, path: &str, params: &TimelineParams) -> Paginator<Status> {
        Paginator::new(self.gateway.clone(), path, params.query())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::Credential;

    #[test]
    fn empty_params_send_no_query() {
        assert!(TimelineParams::default().query().is_none());
    }

    #[test]
    fn params_skip_unset_fields() {
        let params = TimelineParams {
            local: Some(true),
            limit: Some(20),
            ..TimelineParams::default()
        };
        assert_eq!(
            params.query(),
            Some(serde_json::json!({"local": true, "limit": 20}))
        );
    }

    #[test]
    fn home_requires_token() {
        let anonymous = TimelinesRepository::new(RestGateway::new("http://localhost", None).unwrap());
        assert!(matches!(
            anonymous.home(&TimelineParams::default()),
            Err(RestError::Unauthorized(_))
        ));
        assert!(matches!(
            anonymous.list("1", &TimelineParams::default()),
            Err(RestError::Unauthorized(_))
        ));

        let authed = TimelinesRepository::new(
            RestGateway::new("http://localhost", Some(Credential::new("t"))).unwrap(),
        );
        assert!(authed.home(&TimelineParams::default()).is_ok());
    }
}
