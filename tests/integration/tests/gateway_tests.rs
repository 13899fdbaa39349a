//! Gateway integration tests
//!
//! The client connects over a real WebSocket to a loopback fake gateway.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::Duration;

use cord_client::{Client, ClientError, ConnectionState, GatewayError};
use cord_gateway::{CloseCode, GatewayFrame, OpCode};
use integration_tests::{
    config_for_gateway, test_config, FakeGateway, FakeRest, QUIET_INTERVAL_MS, TEST_TOKEN, WAIT,
};
use serde_json::json;
use tokio::sync::mpsc;

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_identify_ready_and_dispatch() {
    let mut gateway = FakeGateway::start().await.unwrap();
    let client = Client::new(config_for_gateway(&gateway.url())).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on("MESSAGE_CREATE", move |_, event| {
        let tx = tx.clone();
        async move {
            tx.send(event).ok();
            Ok(())
        }
    });

    let handle = client.start().await.unwrap();
    let mut peer = gateway.accept().await.unwrap();
    assert_eq!(peer.path, "/gateway?v=10&encoding=json");

    peer.hello(QUIET_INTERVAL_MS).await.unwrap();
    let identify = peer.expect(OpCode::Identify).await.unwrap();
    assert_eq!(identify.d["token"], TEST_TOKEN);
    assert_eq!(identify.d["intents"], 1 | (1 << 9));
    assert_eq!(identify.d["shard"], json!([0, 1]));

    peer.ready("session-1", 1, &gateway.resume_url()).await.unwrap();
    tokio::time::timeout(WAIT, handle.wait_for(|s| s.is_live()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handle.session_id().as_deref(), Some("session-1"));

    peer.dispatch("MESSAGE_CREATE", 2, json!({"content": "hello"}))
        .await
        .unwrap();
    let event = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.name, "MESSAGE_CREATE");
    assert_eq!(event.sequence, Some(2));
    assert_eq!(event.data["content"], "hello");

    client.stop();
    assert_eq!(peer.closed_with().await.unwrap(), Some(1000));
    handle.join().await.unwrap();
    assert_eq!(handle.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_gateway_url_discovered_over_rest() {
    let mut gateway = FakeGateway::start().await.unwrap();
    let rest = FakeRest::start(gateway.url()).await.unwrap();

    let mut config = test_config();
    config.rest = rest.settings();
    let client = Client::new(config).unwrap();

    let handle = client.start().await.unwrap();
    let mut peer = gateway.accept().await.unwrap();
    assert_eq!(peer.path, "/gateway?v=10&encoding=json");

    let requests = rest.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/gateway/bot");
    assert_eq!(requests[0].authorization.as_deref(), Some("Bot test-token"));

    peer.hello(QUIET_INTERVAL_MS).await.unwrap();
    peer.expect(OpCode::Identify).await.unwrap();

    client.stop();
    handle.join().await.unwrap();
}

// ============================================================================
// Reconnect Tests
// ============================================================================

#[tokio::test]
async fn test_reconnect_request_resumes_session() {
    let mut gateway = FakeGateway::start().await.unwrap();
    let client = Client::new(config_for_gateway(&gateway.url())).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on("*", move |_, event| {
        let tx = tx.clone();
        async move {
            tx.send((event.name, event.sequence)).ok();
            Ok(())
        }
    });

    let handle = client.start().await.unwrap();
    let mut first = gateway.accept().await.unwrap();
    first.hello(QUIET_INTERVAL_MS).await.unwrap();
    first.expect(OpCode::Identify).await.unwrap();
    first.ready("session-1", 1, &gateway.resume_url()).await.unwrap();
    first.dispatch("GUILD_CREATE", 2, json!({"id": "10"})).await.unwrap();

    first.send(&GatewayFrame::reconnect()).await.unwrap();
    assert_eq!(first.closed_with().await.unwrap(), Some(4900));

    let mut second = gateway.accept().await.unwrap();
    assert_eq!(second.path, "/resume?v=10&encoding=json");
    second.hello(QUIET_INTERVAL_MS).await.unwrap();
    let resume = second.expect(OpCode::Resume).await.unwrap();
    assert_eq!(resume.d["token"], TEST_TOKEN);
    assert_eq!(resume.d["session_id"], "session-1");
    assert_eq!(resume.d["seq"], 2);

    second.dispatch("RESUMED", 3, json!({})).await.unwrap();
    tokio::time::timeout(WAIT, handle.wait_for(|s| s.is_live()))
        .await
        .unwrap()
        .unwrap();

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let next = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        seen.push(next);
    }
    assert_eq!(
        seen,
        vec![
            ("READY".to_string(), Some(1)),
            ("GUILD_CREATE".to_string(), Some(2)),
            ("RESUMED".to_string(), Some(3)),
        ]
    );

    client.stop();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_authentication_failure_is_fatal() {
    let mut gateway = FakeGateway::start().await.unwrap();
    let client = Client::new(config_for_gateway(&gateway.url())).unwrap();

    let handle = client.start().await.unwrap();
    let mut peer = gateway.accept().await.unwrap();
    peer.hello(QUIET_INTERVAL_MS).await.unwrap();
    peer.expect(OpCode::Identify).await.unwrap();
    peer.close(4004).await.unwrap();

    let result = tokio::time::timeout(WAIT, handle.join()).await.unwrap();
    assert!(matches!(
        result,
        Err(GatewayError::FatalClose(CloseCode::AuthenticationFailed))
    ));
    assert_eq!(handle.state(), ConnectionState::Disconnected);

    // No second connection after a fatal close
    let retry = tokio::time::timeout(Duration::from_millis(200), gateway.accept()).await;
    assert!(retry.is_err());
}

#[tokio::test]
async fn test_client_rejects_second_start() {
    let mut gateway = FakeGateway::start().await.unwrap();
    let client = Client::new(config_for_gateway(&gateway.url())).unwrap();

    let handle = client.start().await.unwrap();
    let _peer = gateway.accept().await.unwrap();
    assert!(matches!(client.start().await, Err(ClientError::AlreadyStarted)));

    client.stop();
    handle.join().await.unwrap();
}
