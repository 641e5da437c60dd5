//! JSON Wire Codec
//!
//! Encodes outbound actions and decodes server-push frames for the
//! streaming endpoint.
//!
//! # Wire Format
//!
//! Outbound:
//! ```json
//! {"type":"subscribe","stream":"hashtag","tag":"rust"}
//! {"type":"unsubscribe","stream":"list","list":"42"}
//! {"type":"request","method":"GET","path":"/api/v1/instance"}
//! ```
//!
//! Inbound:
//! ```json
//! {"stream":["public"],"event":"delete","payload":"123"}
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::application::ports::Serializer;
use crate::domain::action::OutboundAction;
use crate::domain::channel::{ChannelTag, EventPayload, Frame, InboundEvent};
use crate::domain::error::ClientError;

/// Stream field of an inbound frame, a list of tags or a single tag.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireStream {
    Many(Vec<String>),
    One(String),
}

/// Inbound frame as sent by the server.
#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(default)]
    stream: Option<WireStream>,
    event: String,
    #[serde(default)]
    payload: Option<Value>,
}

/// Stateless JSON serializer.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Create a new JSON serializer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn action_object(action: &OutboundAction) -> Map<String, Value> {
        let mut object = Map::new();
        object.insert(
            "type".to_string(),
            Value::String(action.kind().as_str().to_string()),
        );

        match action {
            OutboundAction::Subscribe { stream, params }
            | OutboundAction::Unsubscribe { stream, params } => {
                for (key, value) in params {
                    object.insert(key.clone(), value.clone());
                }
                object.insert("stream".to_string(), Value::String(stream.to_string()));
            }
            OutboundAction::Request { path, method, body } => {
                object.insert(
                    "method".to_string(),
                    Value::String(method.as_str().to_string()),
                );
                object.insert("path".to_string(), Value::String(path.clone()));
                if let Some(body) = body {
                    object.insert("body".to_string(), body.clone());
                }
            }
        }

        object
    }
}

impl Serializer for JsonSerializer {
    fn encode(&self, action: &OutboundAction) -> Result<Frame, ClientError> {
        serde_json::to_string(&Value::Object(Self::action_object(action)))
            .map(Frame::from)
            .map_err(|e| ClientError::Encode(e.to_string()))
    }

    fn decode(&self, frame: &Frame) -> Result<InboundEvent, ClientError> {
        let wire: WireEvent = serde_json::from_str(frame.as_str())
            .map_err(|e| ClientError::MalformedFrame(e.to_string()))?;

        let stream: Vec<ChannelTag> = match wire.stream {
            Some(WireStream::Many(tags)) => tags.into_iter().map(ChannelTag::from).collect(),
            Some(WireStream::One(tag)) => vec![ChannelTag::from(tag)],
            None => Vec::new(),
        };

        if stream.is_empty() || stream.iter().any(ChannelTag::is_empty) {
            return Err(ClientError::MalformedFrame(format!(
                "{} event without a stream tag",
                wire.event
            )));
        }

        Ok(InboundEvent {
            stream,
            event: wire.event,
            payload: wire.payload.filter(|p| !p.is_null()).map(EventPayload::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;
    use crate::domain::action::HttpMethod;
    use crate::domain::channel::Channel;

    fn encode(action: &OutboundAction) -> Value {
        let frame = JsonSerializer::new().encode(action).unwrap();
        serde_json::from_str(frame.as_str()).unwrap()
    }

    #[test_case(Channel::public(), json!({"type": "subscribe", "stream": "public"}) ; "plain")]
    #[test_case(Channel::hashtag("rust"), json!({"type": "subscribe", "stream": "hashtag", "tag": "rust"}) ; "hashtag")]
    #[test_case(Channel::list("42"), json!({"type": "subscribe", "stream": "list", "list": "42"}) ; "list")]
    fn encodes_subscribe(channel: Channel, expected: Value) {
        assert_eq!(encode(&OutboundAction::subscribe(&channel)), expected);
    }

    #[test]
    fn encodes_unsubscribe() {
        assert_eq!(
            encode(&OutboundAction::unsubscribe(&Channel::user_notification())),
            json!({"type": "unsubscribe", "stream": "user:notification"})
        );
    }

    #[test]
    fn stream_param_cannot_override_stream() {
        let mut params = Map::new();
        params.insert("stream".to_string(), json!("other"));
        let action = OutboundAction::Subscribe {
            stream: ChannelTag::from("public"),
            params,
        };

        assert_eq!(encode(&action)["stream"], "public");
    }

    #[test]
    fn encodes_request_with_and_without_body() {
        assert_eq!(
            encode(&OutboundAction::request(HttpMethod::Get, "/api/v1/instance", None)),
            json!({"type": "request", "method": "GET", "path": "/api/v1/instance"})
        );
        assert_eq!(
            encode(&OutboundAction::request(
                HttpMethod::Post,
                "/api/v1/statuses",
                Some(json!({"status": "hello"}))
            )),
            json!({
                "type": "request",
                "method": "POST",
                "path": "/api/v1/statuses",
                "body": {"status": "hello"}
            })
        );
    }

    #[test]
    fn decodes_text_payload() {
        let event = JsonSerializer::new()
            .decode(&Frame::new(
                r#"{"stream":["public"],"event":"delete","payload":"123"}"#,
            ))
            .unwrap();

        assert_eq!(event.stream, vec![ChannelTag::from("public")]);
        assert_eq!(event.event, "delete");
        assert_eq!(event.payload, Some(EventPayload::Text("123".to_string())));
    }

    #[test]
    fn decodes_structured_payload_and_multiple_tags() {
        let event = JsonSerializer::new()
            .decode(&Frame::new(
                r#"{"stream":["hashtag","rust"],"event":"update","payload":{"id":"1"}}"#,
            ))
            .unwrap();

        assert_eq!(event.stream.len(), 2);
        assert_eq!(event.payload, Some(EventPayload::Json(json!({"id": "1"}))));
    }

    #[test]
    fn decodes_event_without_payload() {
        let event = JsonSerializer::new()
            .decode(&Frame::new(r#"{"stream":["user"],"event":"filters_changed"}"#))
            .unwrap();

        assert!(event.payload.is_none());
    }

    #[test_case("not json" ; "invalid json")]
    #[test_case(r#"{"event":"update","payload":"{}"}"# ; "missing stream")]
    #[test_case(r#"{"stream":[],"event":"update"}"# ; "empty stream list")]
    #[test_case(r#"{"stream":[""],"event":"update"}"# ; "empty tag")]
    #[test_case(r#"{"stream":["public"]}"# ; "missing event")]
    #[test_case("[1,2,3]" ; "array frame")]
    fn rejects_malformed_frames(text: &str) {
        let err = JsonSerializer::new().decode(&Frame::new(text)).unwrap_err();
        assert!(matches!(err, ClientError::MalformedFrame(_)));
    }
}
