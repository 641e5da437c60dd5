//! REST Gateway
//!
//! JSON request/response calls against the server's REST API with bearer
//! authentication and retry on transient failures.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::RestError;
use crate::domain::action::{HttpMethod, OutboundAction};
use crate::infrastructure::config::{ClientConfig, Credential};

// =============================================================================
// Retry
// =============================================================================

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }
}

/// Exponential backoff calculator.
struct ExponentialBackoff {
    attempt: u32,
    max_attempts: u32,
    current_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    const fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts,
            current_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            return None;
        }

        let backoff = self.current_backoff;
        self.current_backoff = Duration::from_secs_f64(
            (self.current_backoff.as_secs_f64() * self.multiplier)
                .min(self.max_backoff.as_secs_f64()),
        );

        Some(backoff)
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Error body returned by the server.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the REST API.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RestGateway {
    client: Client,
    base_url: String,
    credential: Option<Credential>,
    version: Option<semver::Version>,
    retry: RetryConfig,
}

impl RestGateway {
    /// Create a gateway for `base_url`, e.g. `https://example.social`.
    ///
    /// # Errors
    ///
    /// Returns `Network` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        credential: Option<Credential>,
    ) -> Result<Self, RestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RestError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            version: None,
            retry: RetryConfig::default(),
        })
    }

    /// Create a gateway from the client configuration.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` when no REST URL is configured.
    pub fn from_config(config: &ClientConfig) -> Result<Self, RestError> {
        let base_url = config
            .rest_url
            .clone()
            .ok_or_else(|| RestError::Unavailable("no REST URL configured".to_string()))?;
        Self::new(base_url, config.credential.clone())
    }

    /// Set the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the server version used by availability guards.
    #[must_use]
    pub fn with_version(mut self, version: semver::Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Server version, if known.
    #[must_use]
    pub const fn version(&self) -> Option<&semver::Version> {
        self.version.as_ref()
    }

    /// Access token, if any.
    #[must_use]
    pub const fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Make a GET request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not match `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        let response = self
            .send(Method::GET, &self.url(path), None::<&()>, None::<&()>)
            .await?;
        decode(response).await
    }

    /// Make a GET request with query parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not match `T`.
    pub async fn get_with<T, Q>(&self, path: &str, query: &Q) -> Result<T, RestError>
    where
        T: DeserializeOwned,
        Q: Serialize + Sync + ?Sized,
    {
        let response = self
            .send(Method::GET, &self.url(path), Some(query), None::<&()>)
            .await?;
        decode(response).await
    }

    /// Make a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not match `T`.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, RestError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        self.with_body(Method::POST, path, body).await
    }

    /// Make a PUT request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not match `T`.
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, RestError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        self.with_body(Method::PUT, path, body).await
    }

    /// Make a PATCH request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not match `T`.
    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, RestError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        self.with_body(Method::PATCH, path, body).await
    }

    /// Make a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not match `T`.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        let response = self
            .send(Method::DELETE, &self.url(path), None::<&()>, None::<&()>)
            .await?;
        decode(response).await
    }

    /// Execute a request action.
    ///
    /// GET bodies are sent as query parameters, other methods send them as
    /// JSON.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAction` for subscribe and unsubscribe actions or
    /// an invalid path, otherwise the request errors.
    pub async fn execute(&self, action: OutboundAction) -> Result<Value, RestError> {
        action
            .validate()
            .map_err(|e| RestError::UnsupportedAction(e.to_string()))?;

        let kind = action.kind();
        let OutboundAction::Request { path, method, body } = action else {
            return Err(RestError::UnsupportedAction(format!(
                "{} cannot be executed over REST",
                kind.as_str()
            )));
        };

        tracing::debug!(method = method.as_str(), path = %path, "Executing request action");

        let url = self.url(&path);
        let response = match (method, body.as_ref()) {
            (HttpMethod::Get, Some(query)) => {
                self.send(Method::GET, &url, Some(query), None::<&()>)
                    .await?
            }
            (method, body) => {
                self.send(http_method(method), &url, None::<&()>, body)
                    .await?
            }
        };

        decode(response).await
    }

    async fn with_body<T, B>(&self, method: Method, path: &str, body: &B) -> Result<T, RestError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let response = self
            .send(method, &self.url(path), None::<&()>, Some(body))
            .await?;
        decode(response).await
    }

    /// Send a request to an absolute URL, retrying transient failures.
    pub(crate) async fn send<Q, B>(
        &self,
        method: Method,
        url: &str,
        query: Option<&Q>,
        body: Option<&B>,
    ) -> Result<Response, RestError>
    where
        Q: Serialize + Sync + ?Sized,
        B: Serialize + Sync + ?Sized,
    {
        let mut backoff = ExponentialBackoff::new(&self.retry);

        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .header(CONTENT_TYPE, "application/json");

            if let Some(credential) = &self.credential {
                request = request.header(AUTHORIZATION, credential.bearer());
            }
            if let Some(query) = query {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let (error, retry_after) = match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => error_from_response(response).await,
                Err(e) => (RestError::Network(e.to_string()), None),
            };

            if error.is_retryable()
                && let Some(delay) = backoff.next_backoff()
            {
                let delay = retry_after.unwrap_or(delay);
                tracing::warn!(
                    error = %error,
                    url,
                    delay_ms = delay.as_millis(),
                    attempt = backoff.attempt,
                    "Request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            tracing::debug!(error = %error, url, "Request failed");
            return Err(error);
        }
    }
}

const fn http_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Decode a JSON body; an empty body decodes as `null`.
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RestError> {
    let text = response
        .text()
        .await
        .map_err(|e| RestError::Network(e.to_string()))?;

    let text = if text.trim().is_empty() { "null" } else { &text };
    serde_json::from_str(text).map_err(|e| RestError::JsonParse(e.to_string()))
}

async fn error_from_response(response: Response) -> (RestError, Option<Duration>) {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body).map_or_else(
        |_| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                body
            }
        },
        |b| b.error,
    );

    let error = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RestError::Unauthorized(message),
        _ => RestError::Api {
            status: status.as_u16(),
            message,
        },
    };

    (error, retry_after)
}
