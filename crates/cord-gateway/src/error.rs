//! Gateway error types

use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::protocol::CloseCode;

/// Gateway error type
///
/// Most variants are handled inside the connection loop by reconnecting and
/// never reach the consumer; see [`GatewayError::is_fatal`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway URL could not be obtained or the socket could not be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// I/O or protocol failure on an open socket
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),

    /// A single frame could not be decoded
    #[error("Failed to decode frame: {0}")]
    Decode(#[from] serde_json::Error),

    /// The server sent something the current state does not allow
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Session invalidated (resumable: {resumable})")]
    SessionInvalidated { resumable: bool },

    #[error("Heartbeat was not acknowledged")]
    ZombieConnection,

    #[error("Gateway closed the connection: {0}")]
    FatalClose(CloseCode),

    #[error("No hello received within {0:?}")]
    HelloTimeout(Duration),

    #[error("Gateway session is not established")]
    NotConnected,

    #[error("Gave up after {0} consecutive reconnect attempts")]
    ReconnectExhausted(u32),

    #[error("Gateway connection is shut down")]
    Shutdown,
}

impl From<tungstenite::Error> for GatewayError {
    fn from(e: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

impl GatewayError {
    /// Whether the connection loop stops instead of reconnecting
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FatalClose(_) | Self::ReconnectExhausted(_) | Self::Shutdown
        )
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
