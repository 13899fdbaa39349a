//! # cord-client
//!
//! Entry point for applications: builds the REST client and the gateway
//! connection from one [`ClientConfig`] and shares a single event table
//! between them.

mod client;
mod error;

pub use client::Client;
pub use error::{ClientError, ClientResult};

// Re-export the types most applications need
pub use cord_common::{ClientConfig, ConfigError};
pub use cord_core::{Activity, ActivityType, Intents, Presence, PresenceStatus, ShardId};
pub use cord_gateway::{
    handler_fn, ConnectionState, EventHandler, GatewayError, GatewayEvent, GatewayHandle,
    HandlerError, HandlerId,
};
pub use cord_rest::{RestClient, RestError, Route};
