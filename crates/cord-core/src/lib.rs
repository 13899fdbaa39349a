//! # cord-core
//!
//! Value objects shared by every layer of the client: gateway intents, shard
//! identity, wire encoding and presence. This crate has no runtime or network
//! dependencies.

pub mod error;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use error::ValueError;
pub use value_objects::{
    Activity, ActivityType, GatewayEncoding, Intents, Presence, PresenceStatus, ShardId,
};
