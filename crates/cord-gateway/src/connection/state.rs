//! Connection lifecycle states

use crate::handshake::HandshakeKind;

/// Where the connection is in its lifecycle
///
/// `Zombied` is transient: it is published when a heartbeat goes
/// unacknowledged and is immediately followed by `Reconnecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingHello,
    Handshaking(HandshakeKind),
    Ready,
    SteadyState,
    Zombied,
    Reconnecting,
}

impl ConnectionState {
    /// A session is established and frames may be sent on it
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Ready | Self::SteadyState)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::AwaitingHello => write!(f, "awaiting_hello"),
            Self::Handshaking(kind) => write!(f, "handshaking({kind})"),
            Self::Ready => write!(f, "ready"),
            Self::SteadyState => write!(f, "steady_state"),
            Self::Zombied => write!(f, "zombied"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}
