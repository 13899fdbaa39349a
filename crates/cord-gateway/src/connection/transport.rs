//! WebSocket transport
//!
//! The connection loop talks to the socket only through [`Transport`], so the
//! state machine can be driven by an in-memory transport in tests.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::GatewayError;
use crate::protocol::GatewayFrame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What a single read from the transport produced
#[derive(Debug)]
pub enum TransportEvent {
    /// A decoded frame
    Frame(GatewayFrame),
    /// A message arrived but could not be decoded; the socket is still usable
    Malformed(GatewayError),
    /// The peer closed the socket, with its close code when one was sent
    Closed(Option<u16>),
    /// The socket failed
    Error(GatewayError),
}

/// One open gateway socket
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: &GatewayFrame) -> Result<(), GatewayError>;

    /// Wait for the next frame; must be cancel safe
    async fn recv(&mut self) -> TransportEvent;

    /// Best-effort close with the given close code
    async fn close(&mut self, code: u16) -> Result<(), GatewayError>;
}

/// Opens transports
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, GatewayError>;
}

/// Connector for real `ws://` and `wss://` endpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, GatewayError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| GatewayError::Connection(format!("{url}: {e}")))?;
        tracing::debug!(url = %url, "WebSocket connected");
        Ok(Box::new(WsTransport { stream }))
    }
}

/// JSON text-frame transport over tokio-tungstenite
pub struct WsTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: &GatewayFrame) -> Result<(), GatewayError> {
        let json = frame.to_json()?;
        self.stream.send(Message::Text(json)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return match GatewayFrame::from_json(&text) {
                        Ok(frame) => TransportEvent::Frame(frame),
                        Err(e) => TransportEvent::Malformed(e.into()),
                    };
                }
                Some(Ok(Message::Binary(_))) => {
                    return TransportEvent::Malformed(GatewayError::ProtocolViolation(
                        "binary message on a JSON connection".to_string(),
                    ));
                }
                Some(Ok(Message::Close(frame))) => {
                    return TransportEvent::Closed(frame.map(|f| f.code.into()));
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => return TransportEvent::Error(e.into()),
                None => return TransportEvent::Closed(None),
            }
        }
    }

    async fn close(&mut self, code: u16) -> Result<(), GatewayError> {
        let frame = CloseFrame {
            code: code.into(),
            reason: "".into(),
        };
        self.stream.close(Some(frame)).await?;
        Ok(())
    }
}
