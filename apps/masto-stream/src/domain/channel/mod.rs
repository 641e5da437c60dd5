//! Channel and Frame Types
//!
//! Core value types shared by every layer of the streaming client:
//! channel tags, channel descriptions, raw frames, decoded inbound
//! events and the connection state machine.
//!
//! # Routing
//!
//! A `ChannelTag` is the key used both for routing inbound events and for
//! reference counting subscriptions. Plain streams (`public`, `user`) use the
//! stream name as tag. Parameterised streams (`hashtag`, `list`) join the
//! parameter into the tag (`list:42`) so that two lists never share a
//! subscription.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Channel Tag
// =============================================================================

/// Opaque identifier of one logical stream multiplexed over the connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelTag(String);

impl ChannelTag {
    /// Create a new channel tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Get the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the tag is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ChannelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelTag {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

impl From<String> for ChannelTag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

// =============================================================================
// Channel
// =============================================================================

/// A stream a subscription can attach to.
///
/// `tag` is the routing key; `stream` and `params` are what the server sees
/// in subscribe and unsubscribe frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    tag: ChannelTag,
    stream: ChannelTag,
    params: Map<String, Value>,
}

impl Channel {
    /// Plain channel whose tag and wire stream are the same string.
    #[must_use]
    pub fn new(stream: impl Into<String>) -> Self {
        let stream = ChannelTag::new(stream);
        Self {
            tag: stream.clone(),
            stream,
            params: Map::new(),
        }
    }

    /// Channel carrying one parameter, routed as `<stream>:<value>`.
    #[must_use]
    pub fn parameterised(stream: &str, key: &str, value: &str) -> Self {
        let mut params = Map::new();
        params.insert(key.to_string(), Value::String(value.to_string()));

        Self {
            tag: ChannelTag::new(format!("{stream}:{value}")),
            stream: ChannelTag::from(stream),
            params,
        }
    }

    /// All public statuses.
    #[must_use]
    pub fn public() -> Self {
        Self::new("public")
    }

    /// Public statuses originating from this server.
    #[must_use]
    pub fn public_local() -> Self {
        Self::new("public:local")
    }

    /// Public statuses originating from other servers.
    #[must_use]
    pub fn public_remote() -> Self {
        Self::new("public:remote")
    }

    /// Home timeline and notifications of the authenticated user.
    #[must_use]
    pub fn user() -> Self {
        Self::new("user")
    }

    /// Notifications of the authenticated user.
    #[must_use]
    pub fn user_notification() -> Self {
        Self::new("user:notification")
    }

    /// Direct conversations.
    #[must_use]
    pub fn direct() -> Self {
        Self::new("direct")
    }

    /// Public statuses containing a hashtag.
    #[must_use]
    pub fn hashtag(tag: &str) -> Self {
        Self::parameterised("hashtag", "tag", tag)
    }

    /// Local statuses containing a hashtag.
    #[must_use]
    pub fn hashtag_local(tag: &str) -> Self {
        Self::parameterised("hashtag:local", "tag", tag)
    }

    /// Statuses of a list.
    #[must_use]
    pub fn list(id: &str) -> Self {
        Self::parameterised("list", "list", id)
    }

    /// Resolve a channel from its written form, e.g. `public:remote`,
    /// `hashtag:local:rust` or `list:42`.
    ///
    /// Unknown names become plain channels.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if let Some(tag) = name.strip_prefix("hashtag:local:") {
            return Self::hashtag_local(tag);
        }

        match name {
            "public" => Self::public(),
            "public:local" => Self::public_local(),
            "public:remote" => Self::public_remote(),
            "user" => Self::user(),
            "user:notification" => Self::user_notification(),
            "direct" => Self::direct(),
            _ => match name.split_once(':') {
                Some(("hashtag", tag)) => Self::hashtag(tag),
                Some(("list", id)) => Self::list(id),
                _ => Self::new(name),
            },
        }
    }

    /// Routing and reference-count key.
    #[must_use]
    pub const fn tag(&self) -> &ChannelTag {
        &self.tag
    }

    /// Stream name sent to the server.
    #[must_use]
    pub const fn stream(&self) -> &ChannelTag {
        &self.stream
    }

    /// Extra subscribe parameters.
    #[must_use]
    pub const fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}

impl From<&str> for Channel {
    fn from(stream: &str) -> Self {
        Self::new(stream)
    }
}

impl From<ChannelTag> for Channel {
    fn from(tag: ChannelTag) -> Self {
        Self {
            stream: tag.clone(),
            tag,
            params: Map::new(),
        }
    }
}

// =============================================================================
// Frame
// =============================================================================

/// One text frame as sent or received on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(String);

impl Frame {
    /// Create a frame from text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Get the frame text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the frame, returning its text.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self(text)
    }
}

// =============================================================================
// Inbound Event
// =============================================================================

/// Payload of an inbound event.
///
/// The server usually sends entity payloads as JSON encoded into a string;
/// some events carry a plain string (a status id for `delete`) and some
/// carry structured JSON directly.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// String payload.
    Text(String),
    /// Structured payload.
    Json(Value),
}

impl EventPayload {
    /// Get the payload as text, if it is a string payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }

    /// Parse the payload into a typed value.
    ///
    /// Text payloads are decoded as JSON first; a text payload that is not
    /// JSON is treated as a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            Self::Text(text) => serde_json::from_str(text)
                .or_else(|_| serde_json::from_value(Value::String(text.clone()))),
            Self::Json(value) => serde_json::from_value(value.clone()),
        }
    }
}

impl From<Value> for EventPayload {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }
}

/// A decoded server-push event.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Tags the event applies to.
    pub stream: Vec<ChannelTag>,
    /// Event kind (`update`, `delete`, `notification`, ...).
    pub event: String,
    /// Event payload, absent for kinds like `filters_changed`.
    pub payload: Option<EventPayload>,
}

impl InboundEvent {
    /// Tags this event must be routed to.
    ///
    /// Every listed tag, plus the `:`-joined tag when more than one is
    /// listed. Duplicates are removed, first occurrence wins.
    #[must_use]
    pub fn routing_tags(&self) -> Vec<ChannelTag> {
        let mut tags: Vec<ChannelTag> = Vec::with_capacity(self.stream.len() + 1);

        for tag in &self.stream {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }

        if self.stream.len() > 1 {
            let joined = ChannelTag::new(
                self.stream
                    .iter()
                    .map(ChannelTag::as_str)
                    .collect::<Vec<_>>()
                    .join(":"),
            );
            if !tags.contains(&joined) {
                tags.push(joined);
            }
        }

        tags
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// State of the physical connection, owned by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Frames can be sent and received.
    Open,
    /// Explicit close in progress.
    Closing,
    /// Connection released (explicitly or after a failure).
    Closed,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Check if frames can be sent.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if a new connection attempt may start from this state.
    #[must_use]
    pub const fn can_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_channel_uses_stream_as_tag() {
        let channel = Channel::public_local();
        assert_eq!(channel.tag().as_str(), "public:local");
        assert_eq!(channel.stream().as_str(), "public:local");
        assert!(channel.params().is_empty());
    }

    #[test]
    fn list_channel_joins_parameter_into_tag() {
        let channel = Channel::list("42");
        assert_eq!(channel.tag().as_str(), "list:42");
        assert_eq!(channel.stream().as_str(), "list");
        assert_eq!(channel.params().get("list"), Some(&Value::from("42")));
    }

    #[test]
    fn hashtag_channel_uses_tag_param() {
        let channel = Channel::hashtag("rust");
        assert_eq!(channel.tag().as_str(), "hashtag:rust");
        assert_eq!(channel.params().get("tag"), Some(&Value::from("rust")));
    }

    #[test]
    fn from_name_resolves_known_channels() {
        assert_eq!(Channel::from_name("public:remote"), Channel::public_remote());
        assert_eq!(Channel::from_name("user:notification"), Channel::user_notification());
        assert_eq!(Channel::from_name("hashtag:rust"), Channel::hashtag("rust"));
        assert_eq!(Channel::from_name("hashtag:local:rust"), Channel::hashtag_local("rust"));
        assert_eq!(Channel::from_name("list:42").tag().as_str(), "list:42");
        assert_eq!(Channel::from_name("list:42").params()["list"], "42");
    }

    #[test]
    fn from_name_keeps_unknown_streams_plain() {
        let channel = Channel::from_name("public:media");

        assert_eq!(channel.stream().as_str(), "public:media");
        assert!(channel.params().is_empty());
    }

    #[test]
    fn routing_tags_single_stream() {
        let event = InboundEvent {
            stream: vec!["public".into()],
            event: "delete".to_string(),
            payload: Some(EventPayload::Text("123".to_string())),
        };
        assert_eq!(event.routing_tags(), vec![ChannelTag::from("public")]);
    }

    #[test]
    fn routing_tags_adds_joined_tag() {
        let event = InboundEvent {
            stream: vec!["list".into(), "42".into()],
            event: "update".to_string(),
            payload: None,
        };
        let tags = event.routing_tags();
        assert_eq!(tags.len(), 3);
        assert!(tags.contains(&ChannelTag::from("list:42")));
    }

    #[test]
    fn routing_tags_deduplicates() {
        let event = InboundEvent {
            stream: vec!["user".into(), "user".into()],
            event: "update".to_string(),
            payload: None,
        };
        let tags = event.routing_tags();
        assert_eq!(
            tags,
            vec![ChannelTag::from("user"), ChannelTag::from("user:user")]
        );
    }

    #[test]
    fn text_payload_parses_json_content() {
        let payload = EventPayload::Text(r#"{"id":"1"}"#.to_string());
        let value: Value = payload.parse().unwrap();
        assert_eq!(value["id"], "1");
    }

    #[test]
    fn text_payload_parses_plain_string() {
        let payload = EventPayload::Text("123".to_string());
        let id: String = payload.parse().unwrap();
        // "123" is valid JSON (a number), so a String target falls back
        assert_eq!(id, "123");
        assert_eq!(payload.as_text(), Some("123"));
    }

    #[test]
    fn connection_state_transitions() {
        assert!(ConnectionState::Disconnected.can_connect());
        assert!(ConnectionState::Closed.can_connect());
        assert!(!ConnectionState::Open.can_connect());
        assert!(!ConnectionState::Connecting.can_connect());
        assert!(ConnectionState::Open.is_open());
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }
}
