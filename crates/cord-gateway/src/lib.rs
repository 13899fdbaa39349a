//! # cord-gateway
//!
//! Client side of the real-time gateway: opens the WebSocket, performs the
//! identify/resume handshake, keeps the heartbeat alive, reconnects when the
//! connection dies and hands every dispatch event to registered handlers.

pub mod connection;
mod error;
pub mod events;
pub mod handshake;
pub mod heartbeat;
pub mod protocol;
pub mod session;

pub use connection::{
    Connector, ConnectionState, GatewayConnection, GatewayDiscovery, GatewayHandle,
    StaticDiscovery, Transport, TransportEvent, WsConnector,
};
pub use error::{GatewayError, GatewayResult};
pub use events::{
    handler_fn, DispatchSummary, EventDispatcher, EventHandler, GatewayEvent, HandlerError,
    HandlerId, WILDCARD,
};
pub use handshake::HandshakeKind;
pub use heartbeat::HeartbeatController;
pub use protocol::{CloseCode, GatewayFrame, OpCode};
pub use session::{SequenceHandle, SequenceUpdate, SessionState};
