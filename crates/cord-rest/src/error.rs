//! REST error types

use std::time::Duration;
use thiserror::Error;

/// Errors delivered to the caller of a single REST request
#[derive(Debug, Error)]
pub enum RestError {
    /// Transport-level failure (DNS, TLS, timeout, connection reset)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status other than 429
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Waiting out the rate limit would pass the caller's deadline
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid client setup: {0}")]
    InvalidSetup(String),

    /// The dispatcher stopped before the request completed
    #[error("Request dispatcher is shut down")]
    Shutdown,
}

impl RestError {
    /// HTTP status code, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// REST result type
pub type RestResult<T> = Result<T, RestError>;
