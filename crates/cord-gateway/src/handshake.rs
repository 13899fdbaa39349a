//! Identify and resume payload construction

use cord_common::ClientConfig;

use crate::protocol::{GatewayFrame, IdentifyPayload, IdentifyProperties, ResumePayload};
use crate::session::SessionState;

/// Which handshake a connection attempt performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeKind {
    Identify,
    Resume,
}

impl std::fmt::Display for HandshakeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identify => write!(f, "identify"),
            Self::Resume => write!(f, "resume"),
        }
    }
}

pub fn identify_payload(config: &ClientConfig) -> IdentifyPayload {
    IdentifyPayload {
        token: config.token.clone(),
        intents: config.intents,
        properties: IdentifyProperties {
            os: config.metadata.os.clone(),
            browser: config.metadata.browser.clone(),
            device: config.metadata.device.clone(),
        },
        compress: config.compress,
        large_threshold: config.large_threshold,
        shard: config.shard,
        presence: config.presence.clone(),
    }
}

/// Identify frame (op 2) for a new session
pub fn identify(config: &ClientConfig) -> GatewayFrame {
    GatewayFrame::identify(&identify_payload(config))
}

/// Resume frame (op 6), or `None` when the session cannot be resumed
pub fn resume(config: &ClientConfig, session: &SessionState) -> Option<GatewayFrame> {
    let session_id = session.session_id()?;
    let seq = session.sequence()?;
    Some(GatewayFrame::resume(&ResumePayload {
        token: config.token.clone(),
        session_id: session_id.to_string(),
        seq,
    }))
}

/// Resume when the session allows it, identify otherwise
pub fn handshake(config: &ClientConfig, session: &SessionState) -> (HandshakeKind, GatewayFrame) {
    match resume(config, session) {
        Some(frame) => (HandshakeKind::Resume, frame),
        None => (HandshakeKind::Identify, identify(config)),
    }
}
