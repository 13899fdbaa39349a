//! Value object errors - raised when parsing or constructing value objects

use thiserror::Error;

/// Errors produced while constructing value objects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("Unknown gateway intent: {0}")]
    UnknownIntent(String),

    #[error("Shard index {index} out of range for shard count {count}")]
    ShardOutOfRange { index: u32, count: u32 },

    #[error("Shard count must be at least 1")]
    ZeroShardCount,

    #[error("Unknown gateway encoding: {0}")]
    UnknownEncoding(String),

    #[error("Unknown presence status: {0}")]
    UnknownStatus(String),
}
