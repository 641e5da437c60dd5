//! Endpoint Guards
//!
//! Checks run before a request is built: whether the endpoint needs an
//! access token and whether it exists on the server's version.

use semver::Version;

use super::error::RestError;
use crate::infrastructure::config::Credential;

/// Version range in which an endpoint exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Availability {
    /// First version providing the endpoint.
    pub since: Option<Version>,
    /// Last version providing the endpoint.
    pub until: Option<Version>,
}

impl Availability {
    /// Endpoint available from `major.minor.patch` on.
    #[must_use]
    pub const fn since(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            since: Some(Version::new(major, minor, patch)),
            until: None,
        }
    }

    /// Endpoint removed after `major.minor.patch`.
    #[must_use]
    pub fn until(mut self, major: u64, minor: u64, patch: u64) -> Self {
        self.until = Some(Version::new(major, minor, patch));
        self
    }
}

/// Fail unless a credential is present.
///
/// # Errors
///
/// Returns `Unauthorized` naming the endpoint.
pub fn require_authentication(credential: Option<&Credential>, name: &str) -> Result<(), RestError> {
    if credential.is_none() {
        return Err(RestError::Unauthorized(format!(
            "endpoint {name} requires authentication; register an application \
             on the server to obtain an access token"
        )));
    }
    Ok(())
}

/// Fail if `version` lies outside `availability`.
///
/// An unknown version passes. Build metadata is ignored.
///
/// # Errors
///
/// Returns `Unavailable` naming the endpoint and the version bound.
pub fn require_version(
    version: Option<&Version>,
    availability: &Availability,
    name: &str,
) -> Result<(), RestError> {
    let Some(version) = version else {
        return Ok(());
    };

    if let Some(since) = &availability.since
        && version.cmp_precedence(since).is_lt()
    {
        return Err(RestError::Unavailable(format!(
            "{name} is not available with server version {version}; \
             it requires version {since} or later"
        )));
    }

    if let Some(until) = &availability.until
        && version.cmp_precedence(until).is_gt()
    {
        return Err(RestError::Unavailable(format!(
            "{name} is not available with server version {version}; \
             it was removed after version {until}"
        )));
    }

    Ok(())
}

/// Parse the version reported by a server.
///
/// Accepts suffixed versions such as `4.2.0+glitch` or `3.5.0rc1` by
/// keeping the leading `major.minor.patch`.
#[must_use]
pub fn parse_server_version(raw: &str) -> Option<Version> {
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }

    let mut parts = raw.split('.').map(|part| {
        part.chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse::<u64>()
            .ok()
    });

    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some(Version::new(major, minor, patch))
}
