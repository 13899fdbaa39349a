//! # cord-rest
//!
//! Outbound REST calls. Every request goes through a single serialized
//! [`RequestDispatcher`] worker that honours the platform's rate-limit
//! responses.

mod client;
pub mod dispatcher;
mod error;
pub mod executor;
mod models;
mod route;

pub use client::RestClient;
pub use dispatcher::{RequestDispatcher, ResponseHandle};
pub use error::{RestError, RestResult};
pub use executor::{HttpExecutor, HttpOutcome, RateLimit, ReqwestExecutor};
pub use models::{GatewayBotInfo, SessionStartLimit};
pub use route::{RestRequest, Route};

pub use reqwest::Method;
