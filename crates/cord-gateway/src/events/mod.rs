//! Inbound event routing
//!
//! Dispatch frames become [`GatewayEvent`]s and are handed to every handler
//! registered for the event name, in registration order.

mod dispatcher;
mod event;
mod handler;

pub use dispatcher::{DispatchSummary, EventDispatcher, HandlerId, WILDCARD};
pub use event::GatewayEvent;
pub use handler::{handler_fn, EventHandler, FnHandler, HandlerError};
