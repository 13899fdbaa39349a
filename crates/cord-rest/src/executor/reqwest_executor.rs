//! `reqwest`-backed executor

use async_trait::async_trait;
use cord_common::RestSettings;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::{HttpExecutor, HttpOutcome, RateLimit};
use crate::error::RestError;
use crate::route::RestRequest;

/// Executor that talks to the real API over HTTPS
pub struct ReqwestExecutor {
    http: Client,
    base_url: String,
}

impl ReqwestExecutor {
    /// Build an executor authenticating with `Bot <token>`
    pub fn new(settings: &RestSettings, token: &str) -> Result<Self, RestError> {
        let mut auth = HeaderValue::from_str(&format!("Bot {token}"))
            .map_err(|_| RestError::InvalidSetup("token is not a valid header value".into()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: &RestRequest) -> Result<HttpOutcome, RestError> {
        let mut builder = self
            .http
            .request(request.route.method.clone(), self.url(&request.route.path));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let header = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Ok(HttpOutcome::RateLimited(RateLimit::from_response(
                &body,
                header.as_deref(),
            )));
        }

        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(RestError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        if bytes.is_empty() {
            Ok(HttpOutcome::Success(Value::Null))
        } else {
            Ok(HttpOutcome::Success(serde_json::from_slice(&bytes)?))
        }
    }
}
