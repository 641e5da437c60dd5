//! Outbound Actions
//!
//! Typed requests the client sends to the server. Every action maps to
//! exactly one serialized frame (or one HTTP request for `Request`).
//!
//! Untyped input enters through `RawAction`; converting it into an
//! `OutboundAction` is where unknown kinds and partially constructed
//! actions are rejected.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::channel::{Channel, ChannelTag};
use super::error::ClientError;

// =============================================================================
// HTTP Method
// =============================================================================

/// HTTP method of a request action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Parse a method name, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Get the method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Outbound Action
// =============================================================================

/// Kind of an outbound action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Start receiving a stream.
    Subscribe,
    /// Stop receiving a stream.
    Unsubscribe,
    /// Request/response call.
    Request,
}

impl ActionKind {
    /// Get the wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Request => "request",
        }
    }
}

/// A typed outbound action.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAction {
    /// Subscribe to a stream.
    Subscribe {
        /// Wire stream name.
        stream: ChannelTag,
        /// Extra stream parameters.
        params: Map<String, Value>,
    },
    /// Unsubscribe from a stream.
    Unsubscribe {
        /// Wire stream name.
        stream: ChannelTag,
        /// Stream parameters identifying a parameterised stream.
        params: Map<String, Value>,
    },
    /// Request/response call.
    Request {
        /// Path relative to the server root, e.g. `/api/v1/instance`.
        path: String,
        /// HTTP method.
        method: HttpMethod,
        /// JSON body (query parameters for GET).
        body: Option<Value>,
    },
}

impl OutboundAction {
    /// Subscribe action for a channel.
    #[must_use]
    pub fn subscribe(channel: &Channel) -> Self {
        Self::Subscribe {
            stream: channel.stream().clone(),
            params: channel.params().clone(),
        }
    }

    /// Unsubscribe action for a channel.
    #[must_use]
    pub fn unsubscribe(channel: &Channel) -> Self {
        Self::Unsubscribe {
            stream: channel.stream().clone(),
            params: channel.params().clone(),
        }
    }

    /// Request action.
    #[must_use]
    pub fn request(method: HttpMethod, path: impl Into<String>, body: Option<Value>) -> Self {
        Self::Request {
            path: path.into(),
            method,
            body,
        }
    }

    /// Get the action kind.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Subscribe { .. } => ActionKind::Subscribe,
            Self::Unsubscribe { .. } => ActionKind::Unsubscribe,
            Self::Request { .. } => ActionKind::Request,
        }
    }

    /// Validate the action shape.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAction` for an empty stream name or a request
    /// path that is not absolute.
    pub fn validate(&self) -> Result<(), ClientError> {
        match self {
            Self::Subscribe { stream, .. } | Self::Unsubscribe { stream, .. } => {
                if stream.is_empty() {
                    return Err(ClientError::UnsupportedAction(format!(
                        "{} action without a stream",
                        self.kind().as_str()
                    )));
                }
            }
            Self::Request { path, .. } => {
                if !path.starts_with('/') {
                    return Err(ClientError::UnsupportedAction(format!(
                        "request path must start with '/': {path:?}"
                    )));
                }
            }
        }

        Ok(())
    }
}

// =============================================================================
// Raw Action
// =============================================================================

/// An action as received from untyped input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    /// Action kind (`subscribe`, `unsubscribe`, `request`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Stream name for subscribe/unsubscribe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    /// Stream parameters.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    /// Request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Request method, defaults to GET.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl TryFrom<RawAction> for OutboundAction {
    type Error = ClientError;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let missing = |field: &str| {
            ClientError::UnsupportedAction(format!("{} action without {field}", raw.kind))
        };

        let action = match raw.kind.as_str() {
            "subscribe" => Self::Subscribe {
                stream: raw.stream.clone().ok_or_else(|| missing("stream"))?.into(),
                params: raw.params,
            },
            "unsubscribe" => Self::Unsubscribe {
                stream: raw.stream.clone().ok_or_else(|| missing("stream"))?.into(),
                params: raw.params,
            },
            "request" => {
                let method = match raw.method.as_deref() {
                    None => HttpMethod::Get,
                    Some(name) => HttpMethod::from_str_case_insensitive(name).ok_or_else(|| {
                        ClientError::UnsupportedAction(format!("unknown request method: {name}"))
                    })?,
                };
                Self::Request {
                    path: raw.path.clone().ok_or_else(|| missing("path"))?,
                    method,
                    body: raw.body,
                }
            }
            other => {
                return Err(ClientError::UnsupportedAction(format!(
                    "unknown action type: {other:?}"
                )));
            }
        };

        action.validate()?;
        Ok(action)
    }
}
