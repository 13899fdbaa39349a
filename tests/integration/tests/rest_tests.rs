//! REST dispatcher integration tests
//!
//! Requests go over real HTTP to a loopback fake API.
//!
//! Run with: cargo test -p integration-tests --test rest_tests

use std::time::Duration;

use cord_rest::{RestClient, RestError, Route};
use integration_tests::{FakeRest, TEST_TOKEN, WAIT};
use serde_json::json;

fn message(content: &str) -> Option<serde_json::Value> {
    Some(json!({ "content": content }))
}

#[tokio::test]
async fn test_post_message() {
    let server = FakeRest::start("ws://unused").await.unwrap();
    let rest = RestClient::new(&server.settings(), TEST_TOKEN).unwrap();

    let reply = rest
        .request(Route::post("/channels/42/messages"), message("hi"))
        .await
        .unwrap();
    assert_eq!(reply["channel_id"], "42");
    assert_eq!(reply["content"], "hi");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization.as_deref(), Some("Bot test-token"));
    assert_eq!(requests[0].body, json!({"content": "hi"}));
    rest.stop();
}

#[tokio::test]
async fn test_rate_limited_request_is_retried_first() {
    let server = FakeRest::start_with_rate_limits("ws://unused", 1, 0.05)
        .await
        .unwrap();
    let rest = RestClient::new(&server.settings(), TEST_TOKEN).unwrap();

    let first = rest.request(Route::post("/channels/1/messages"), message("first"));
    let second = rest.request(Route::post("/channels/1/messages"), message("second"));
    let third = rest.request(Route::post("/channels/1/messages"), message("third"));

    let (first, second, third) = tokio::time::timeout(WAIT, async {
        tokio::join!(first, second, third)
    })
    .await
    .unwrap();
    assert_eq!(first.unwrap()["content"], "first");
    assert_eq!(second.unwrap()["content"], "second");
    assert_eq!(third.unwrap()["content"], "third");

    let order: Vec<(String, u16)> = server
        .requests()
        .into_iter()
        .map(|r| (r.body["content"].as_str().unwrap_or_default().to_string(), r.status))
        .collect();
    assert_eq!(
        order,
        vec![
            ("first".to_string(), 429),
            ("first".to_string(), 200),
            ("second".to_string(), 200),
            ("third".to_string(), 200),
        ]
    );
    rest.stop();
}

#[tokio::test]
async fn test_rate_limit_beyond_deadline_fails() {
    let server = FakeRest::start_with_rate_limits("ws://unused", 1, 30.0)
        .await
        .unwrap();
    let rest = RestClient::new(&server.settings(), TEST_TOKEN).unwrap();

    let result = rest
        .request_within(
            Route::post("/channels/1/messages"),
            message("late"),
            Duration::from_secs(1),
        )
        .await;
    assert!(matches!(result, Err(RestError::RateLimited { .. })));
    rest.stop();
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let server = FakeRest::start("ws://unused").await.unwrap();
    let rest = RestClient::new(&server.settings(), TEST_TOKEN).unwrap();

    let result = rest.request(Route::get("/users/@me"), None).await;
    match result {
        Err(RestError::Status { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected a 404, got {other:?}"),
    }
    rest.stop();
}

#[tokio::test]
async fn test_gateway_bot() {
    let server = FakeRest::start("ws://127.0.0.1:9/gateway").await.unwrap();
    let rest = RestClient::new(&server.settings(), TEST_TOKEN).unwrap();

    let info = rest.gateway_bot().await.unwrap();
    assert_eq!(info.url, "ws://127.0.0.1:9/gateway");
    assert_eq!(info.shards, 1);
    assert_eq!(info.session_start_limit.remaining, 999);
    rest.stop();
}

#[tokio::test]
async fn test_stopped_client_rejects_requests() {
    let server = FakeRest::start("ws://unused").await.unwrap();
    let rest = RestClient::new(&server.settings(), TEST_TOKEN).unwrap();
    rest.stop();

    let result = rest
        .request(Route::post("/channels/1/messages"), message("dropped"))
        .await;
    assert!(matches!(result, Err(RestError::Shutdown)));
    assert!(server.requests().is_empty());
}
