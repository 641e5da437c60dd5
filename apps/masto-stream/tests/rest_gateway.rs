//! REST Gateway Integration Tests
//!
//! Exercises the gateway, pagination and repositories against a mock HTTP
//! server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use masto_stream::infrastructure::rest::RetryConfig;
use masto_stream::infrastructure::rest::entities::{Instance, Status};
use masto_stream::{
    Credential, HttpMethod, InstanceRepository, OutboundAction, RestError, RestGateway,
    TimelineParams, TimelinesRepository,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        multiplier: 2.0,
    }
}

fn gateway(server: &MockServer) -> RestGateway {
    RestGateway::new(server.uri(), Some(Credential::new("token")))
        .unwrap()
        .with_retry(RetryConfig::none())
}

fn anonymous(server: &MockServer) -> RestGateway {
    RestGateway::new(server.uri(), None)
        .unwrap()
        .with_retry(RetryConfig::none())
}

fn instance_body(version: &str) -> Value {
    json!({
        "uri": "example.social",
        "title": "Example",
        "version": version,
        "urls": {"streaming_api": "wss://example.social"}
    })
}

fn status_body(id: &str) -> Value {
    json!({
        "id": id,
        "uri": format!("https://example.social/users/alice/statuses/{id}"),
        "created_at": "2024-05-01T12:00:00.000Z",
        "account": {"id": "1", "username": "alice", "acct": "alice"},
        "content": "<p>hello</p>",
        "visibility": "public"
    })
}

// =============================================================================
// Gateway
// =============================================================================

#[tokio::test]
async fn sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/instance"))
        .and(header("authorization", "Bearer token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_body("4.2.1")))
        .expect(1)
        .mount(&server)
        .await;

    let instance: Instance = gateway(&server).get("/api/v1/instance").await.unwrap();

    assert_eq!(instance.uri, "example.social");
    assert_eq!(
        instance.urls.streaming_api.as_deref(),
        Some("wss://example.social")
    );
}

#[tokio::test]
async fn rejected_token_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/timelines/home"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "The access token is invalid"})),
        )
        .mount(&server)
        .await;

    let err = gateway(&server)
        .get::<Value>("/api/v1/timelines/home")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RestError::Unauthorized("The access token is invalid".to_string())
    );
}

#[tokio::test]
async fn error_body_becomes_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({"error": "Validation failed: Text can't be blank"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = gateway(&server)
        .with_retry(fast_retry())
        .post::<Value, _>("/api/v1/statuses", &json!({"status": ""}))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RestError::Api {
            status: 422,
            message: "Validation failed: Text can't be blank".to_string(),
        }
    );
}

#[tokio::test]
async fn retries_unavailable_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/instance"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/instance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_body("4.3.0")))
        .mount(&server)
        .await;

    let instance: Instance = gateway(&server)
        .with_retry(fast_retry())
        .get("/api/v1/instance")
        .await
        .unwrap();

    assert_eq!(instance.version, "4.3.0");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/instance"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = gateway(&server)
        .with_retry(fast_retry())
        .get::<Instance>("/api/v1/instance")
        .await
        .unwrap_err();

    assert!(matches!(err, RestError::Api { status: 502, .. }));
}

#[tokio::test]
async fn empty_body_decodes_as_null() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/statuses/1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let value: Value = gateway(&server)
        .delete("/api/v1/statuses/1")
        .await
        .unwrap();

    assert_eq!(value, Value::Null);
}

// =============================================================================
// Request Actions
// =============================================================================

#[tokio::test]
async fn get_action_sends_body_as_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/timelines/tag/rust"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([status_body("1")])))
        .expect(1)
        .mount(&server)
        .await;

    let value = gateway(&server)
        .execute(OutboundAction::request(
            HttpMethod::Get,
            "/api/v1/timelines/tag/rust",
            Some(json!({"limit": 2})),
        ))
        .await
        .unwrap();

    assert_eq!(value[0]["id"], "1");
}

#[tokio::test]
async fn post_action_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .and(body_json(json!({"status": "hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("9")))
        .expect(1)
        .mount(&server)
        .await;

    let value = gateway(&server)
        .execute(OutboundAction::request(
            HttpMethod::Post,
            "/api/v1/statuses",
            Some(json!({"status": "hello"})),
        ))
        .await
        .unwrap();

    assert_eq!(value["id"], "9");
}

#[tokio::test]
async fn subscribe_action_is_not_executed() {
    let server = MockServer::start().await;

    let err = gateway(&server)
        .execute(OutboundAction::subscribe(&masto_stream::Channel::public()))
        .await
        .unwrap_err();

    assert!(matches!(err, RestError::UnsupportedAction(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

// =============================================================================
// Pagination
// =============================================================================

#[tokio::test]
async fn follows_next_links_until_exhausted() {
    let server = MockServer::start().await;
    let next = format!("<{}/api/v1/timelines/public?max_id=2>; rel=\"next\"", server.uri());

    Mock::given(method("GET"))
        .and(path("/api/v1/timelines/public"))
        .and(query_param("local", "true"))
        .and(query_param_is_missing("max_id"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .set_body_json(json!([status_body("3"), status_body("2")])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/timelines/public"))
        .and(query_param("max_id", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([status_body("1")])))
        .expect(1)
        .mount(&server)
        .await;

    let params = TimelineParams {
        local: Some(true),
        ..TimelineParams::default()
    };
    let statuses: Vec<Status> = TimelinesRepository::new(anonymous(&server))
        .public(&params)
        .collect_all()
        .await
        .unwrap();

    let ids: Vec<&str> = statuses.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["3", "2", "1"]);
}

#[tokio::test]
async fn empty_page_ends_pagination() {
    let server = MockServer::start().await;
    let next = format!("<{}/api/v1/instance/peers?page=2>; rel=\"next\"", server.uri());

    Mock::given(method("GET"))
        .and(path("/api/v1/instance/peers"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .set_body_json(json!([])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut peers = InstanceRepository::new(anonymous(&server)).peers();

    assert!(peers.next_page().await.unwrap().is_none());
    assert!(!peers.has_next());
}

#[tokio::test]
async fn home_timeline_needs_token_before_any_request() {
    let server = MockServer::start().await;

    let err = TimelinesRepository::new(anonymous(&server))
        .home(&TimelineParams::default())
        .unwrap_err();

    assert!(matches!(err, RestError::Unauthorized(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

// =============================================================================
// Version Guards
// =============================================================================

#[tokio::test]
async fn negotiated_version_unlocks_languages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/instance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_body("4.2.1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/instance/languages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"code": "en", "name": "English"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let negotiated = InstanceRepository::new(gateway(&server))
        .negotiate()
        .await
        .unwrap();
    assert_eq!(negotiated.version(), Some(&semver::Version::new(4, 2, 1)));

    let languages = InstanceRepository::new(negotiated)
        .languages()
        .await
        .unwrap();
    assert_eq!(languages[0].code, "en");
}

#[tokio::test]
async fn old_server_rejects_languages_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/instance/languages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let old = gateway(&server).with_version(semver::Version::new(4, 1, 0));
    let err = InstanceRepository::new(old).languages().await.unwrap_err();

    assert!(matches!(err, RestError::Unavailable(_)));
}
