//! HTTP execution seam
//!
//! The dispatcher only knows how to order requests; sending them is delegated
//! to an [`HttpExecutor`].

mod reqwest_executor;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::RestError;
use crate::route::RestRequest;

pub use reqwest_executor::ReqwestExecutor;

/// Result of a single HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub enum HttpOutcome {
    /// 2xx response body (`Value::Null` for empty bodies)
    Success(Value),
    /// 429 response
    RateLimited(RateLimit),
}

/// Details of a 429 response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    pub retry_after: Duration,
    /// The limit applies to every route for this token
    pub global: bool,
}

impl RateLimit {
    /// Fallback pause when the response names no duration
    pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

    /// Read the retry delay from a 429 response
    ///
    /// The JSON body's `retry_after` (float seconds) wins over the
    /// `Retry-After` header.
    pub fn from_response(body: &Value, retry_after_header: Option<&str>) -> Self {
        let from_body = body
            .get("retry_after")
            .and_then(Value::as_f64)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        let from_header = retry_after_header
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

        Self {
            retry_after: from_body
                .or(from_header)
                .unwrap_or(Self::DEFAULT_RETRY_AFTER),
            global: body.get("global").and_then(Value::as_bool).unwrap_or(false),
        }
    }
}

/// Sends one request and classifies the response
#[async_trait]
pub trait HttpExecutor: Send + Sync + 'static {
    async fn execute(&self, request: &RestRequest) -> Result<HttpOutcome, RestError>;
}
