//! Integration test utilities for cord
//!
//! This crate runs a fake gateway (WebSocket) and a fake REST API on
//! loopback sockets so the client can be exercised end to end.

pub mod fake_gateway;
pub mod fake_rest;
pub mod fixtures;

pub use fake_gateway::*;
pub use fake_rest::*;
pub use fixtures::*;
