//! Loopback HTTP server standing in for the REST API

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cord_common::RestSettings;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One request the fake API answered
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
    pub status: u16,
}

struct RestState {
    gateway_url: String,
    /// Message posts still to be answered with 429
    rate_limits: AtomicUsize,
    retry_after_secs: f64,
    log: Mutex<Vec<Recorded>>,
}

impl RestState {
    fn record(&self, path: String, headers: &HeaderMap, body: Value, status: StatusCode) {
        let authorization = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.log.lock().push(Recorded {
            path,
            authorization,
            body,
            status: status.as_u16(),
        });
    }
}

/// Fake REST API instance that manages its server task
pub struct FakeRest {
    pub addr: SocketAddr,
    state: Arc<RestState>,
    _handle: JoinHandle<()>,
}

impl FakeRest {
    /// Start a fake API whose `/gateway/bot` points at `gateway_url`
    pub async fn start(gateway_url: impl Into<String>) -> Result<Self> {
        Self::start_with_rate_limits(gateway_url, 0, 0.0).await
    }

    /// Start a fake API that answers the first `rate_limits` message posts
    /// with 429 and `retry_after` seconds
    pub async fn start_with_rate_limits(
        gateway_url: impl Into<String>,
        rate_limits: usize,
        retry_after_secs: f64,
    ) -> Result<Self> {
        let state = Arc::new(RestState {
            gateway_url: gateway_url.into(),
            rate_limits: AtomicUsize::new(rate_limits),
            retry_after_secs,
            log: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/v10/gateway/bot", get(gateway_bot))
            .route("/api/v10/channels/:channel_id/messages", post(create_message))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// API base URL including the version prefix
    pub fn base_url(&self) -> String {
        format!("http://{}/api/v10", self.addr)
    }

    /// REST settings pointing at this server, without client-side throttling
    pub fn settings(&self) -> RestSettings {
        RestSettings {
            base_url: self.base_url(),
            requests_per_second: None,
            ..RestSettings::default()
        }
    }

    /// Every request answered so far, in arrival order
    pub fn requests(&self) -> Vec<Recorded> {
        self.state.log.lock().clone()
    }
}

async fn gateway_bot(State(state): State<Arc<RestState>>, headers: HeaderMap) -> Json<Value> {
    state.record("/gateway/bot".to_string(), &headers, Value::Null, StatusCode::OK);
    Json(json!({
        "url": state.gateway_url,
        "shards": 1,
        "session_start_limit": {
            "total": 1000,
            "remaining": 999,
            "reset_after": 14_400_000,
            "max_concurrency": 1
        }
    }))
}

async fn create_message(
    State(state): State<Arc<RestState>>,
    Path(channel_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let path = format!("/channels/{channel_id}/messages");

    let limited = state
        .rate_limits
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if limited {
        state.record(path, &headers, body, StatusCode::TOO_MANY_REQUESTS);
        let payload = json!({
            "message": "You are being rate limited.",
            "retry_after": state.retry_after_secs,
            "global": false
        });
        return (StatusCode::TOO_MANY_REQUESTS, Json(payload)).into_response();
    }

    let id = state.log.lock().len();
    let reply = json!({
        "id": id.to_string(),
        "channel_id": channel_id,
        "content": body.get("content").cloned().unwrap_or(Value::Null)
    });
    state.record(path, &headers, body, StatusCode::OK);
    (StatusCode::OK, Json(reply)).into_response()
}
