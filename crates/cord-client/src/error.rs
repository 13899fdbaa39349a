//! Client error type

use cord_common::ConfigError;
use cord_gateway::GatewayError;
use cord_rest::RestError;
use thiserror::Error;

/// Errors surfaced by [`Client`](crate::Client)
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rest(#[from] RestError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Gateway connection is already running")]
    AlreadyStarted,
}

/// Client result type
pub type ClientResult<T> = Result<T, ClientError>;
