//! REST client facade

use cord_common::RestSettings;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::dispatcher::{RequestDispatcher, ResponseHandle};
use crate::error::RestError;
use crate::executor::{HttpExecutor, ReqwestExecutor};
use crate::models::GatewayBotInfo;
use crate::route::Route;

/// Cloneable handle to the shared request dispatcher
#[derive(Clone)]
pub struct RestClient {
    dispatcher: Arc<RequestDispatcher>,
}

impl RestClient {
    /// Create a client for the real API
    ///
    /// Must be called from within a Tokio runtime; the dispatcher worker is
    /// spawned immediately.
    pub fn new(settings: &RestSettings, token: &str) -> Result<Self, RestError> {
        let executor = ReqwestExecutor::new(settings, token)?;
        Ok(Self::with_executor(
            Arc::new(executor),
            settings.requests_per_second,
        ))
    }

    /// Create a client over a custom executor
    pub fn with_executor(executor: Arc<dyn HttpExecutor>, requests_per_second: Option<u32>) -> Self {
        Self {
            dispatcher: Arc::new(RequestDispatcher::spawn(executor, requests_per_second)),
        }
    }

    /// Queue a request
    pub fn request(&self, route: Route, body: Option<Value>) -> ResponseHandle {
        self.dispatcher.submit(route, body)
    }

    /// Queue a request that fails instead of waiting out long rate limits
    pub fn request_within(
        &self,
        route: Route,
        body: Option<Value>,
        max_wait: Duration,
    ) -> ResponseHandle {
        self.dispatcher.submit_with_deadline(route, body, max_wait)
    }

    /// `GET /gateway/bot`: connection URL, shard recommendation and identify budget
    pub async fn gateway_bot(&self) -> Result<GatewayBotInfo, RestError> {
        self.request(Route::get("/gateway/bot"), None).json().await
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// Stop the dispatcher; queued requests fail with [`RestError::Shutdown`]
    pub fn stop(&self) {
        self.dispatcher.stop();
    }
}
