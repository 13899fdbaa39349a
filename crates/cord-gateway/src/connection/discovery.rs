//! Gateway URL discovery

use async_trait::async_trait;
use cord_rest::{GatewayBotInfo, RestClient, SessionStartLimit};

use crate::error::GatewayError;

/// Source of the URL (and shard recommendation) to connect to
#[async_trait]
pub trait GatewayDiscovery: Send + Sync + 'static {
    async fn discover(&self) -> Result<GatewayBotInfo, GatewayError>;
}

/// `GET /gateway/bot` through the REST dispatcher
#[async_trait]
impl GatewayDiscovery for RestClient {
    async fn discover(&self) -> Result<GatewayBotInfo, GatewayError> {
        self.gateway_bot()
            .await
            .map_err(|e| GatewayError::Connection(format!("gateway discovery failed: {e}")))
    }
}

/// A fixed URL, for self-hosted or test gateways
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    url: String,
}

impl StaticDiscovery {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl GatewayDiscovery for StaticDiscovery {
    async fn discover(&self) -> Result<GatewayBotInfo, GatewayError> {
        Ok(GatewayBotInfo {
            url: self.url.clone(),
            shards: 1,
            session_start_limit: SessionStartLimit {
                total: 1,
                remaining: 1,
                reset_after: 0,
                max_concurrency: 1,
            },
        })
    }
}
