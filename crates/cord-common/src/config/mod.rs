//! Configuration structs

mod client_config;

pub use client_config::{ClientConfig, ClientMetadata, ConfigError, GatewaySettings, RestSettings};
