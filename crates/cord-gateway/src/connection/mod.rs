//! Gateway connection lifecycle
//!
//! [`GatewayConnection`] discovers the URL and opens the first socket, then
//! hands everything to a background task. Consumers keep a [`GatewayHandle`].

mod discovery;
mod handle;
#[cfg(test)]
mod mock;
mod reconnect;
mod runner;
mod state;
mod transport;

pub use discovery::{GatewayDiscovery, StaticDiscovery};
pub use handle::GatewayHandle;
pub use runner::GatewayConnection;
pub use state::ConnectionState;
pub use transport::{Connector, Transport, TransportEvent, WsConnector, WsTransport};
