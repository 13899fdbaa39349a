use std::future::Future;

use async_trait::async_trait;

use super::GatewayEvent;
use crate::connection::GatewayHandle;

/// Error returned by an event handler; logged and otherwise ignored
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer callback for dispatch events
///
/// The handle gives access to the connection that produced the event, e.g.
/// to update presence in response.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, gateway: &GatewayHandle, event: &GatewayEvent) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into an [`EventHandler`]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a handler
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(GatewayHandle, GatewayEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(GatewayHandle, GatewayEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, gateway: &GatewayHandle, event: &GatewayEvent) -> Result<(), HandlerError> {
        (self.f)(gateway.clone(), event.clone()).await
    }
}
