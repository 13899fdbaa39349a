//! # cord-common
//!
//! Shared utilities: client configuration loaded from the environment and
//! tracing setup.

pub mod config;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{ClientConfig, ClientMetadata, ConfigError, GatewaySettings, RestSettings};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
