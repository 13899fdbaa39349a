//! Loopback WebSocket server speaking the gateway protocol
//!
//! Each accepted connection is handed to the test as a [`GatewayPeer`]; the
//! test scripts the server side frame by frame.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use cord_gateway::{GatewayFrame, OpCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// How long a helper waits for the client before failing the test
pub const WAIT: Duration = Duration::from_secs(5);

/// Fake gateway instance that manages its accept loop
pub struct FakeGateway {
    pub addr: SocketAddr,
    peers: mpsc::UnboundedReceiver<GatewayPeer>,
    _handle: JoinHandle<()>,
}

impl FakeGateway {
    /// Bind to an ephemeral loopback port and start accepting
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let (tx, peers) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                match upgrade(stream).await {
                    Ok(peer) => {
                        if tx.send(peer).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("fake gateway handshake failed: {e}"),
                }
            }
        });

        Ok(Self {
            addr,
            peers,
            _handle: handle,
        })
    }

    /// URL to configure as the gateway URL
    pub fn url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// URL advertised in READY as `resume_gateway_url`
    pub fn resume_url(&self) -> String {
        format!("ws://{}/resume", self.addr)
    }

    /// Wait for the client to connect
    pub async fn accept(&mut self) -> Result<GatewayPeer> {
        tokio::time::timeout(WAIT, self.peers.recv())
            .await
            .map_err(|_| anyhow!("client did not connect within {WAIT:?}"))?
            .ok_or_else(|| anyhow!("fake gateway stopped"))
    }
}

async fn upgrade(stream: TcpStream) -> Result<GatewayPeer> {
    let mut path = String::new();
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        path = request.uri().to_string();
        Ok(response)
    };
    let stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    Ok(GatewayPeer { path, stream })
}

/// Server side of one client connection
pub struct GatewayPeer {
    /// Request path and query the client connected with
    pub path: String,
    stream: WebSocketStream<TcpStream>,
}

impl GatewayPeer {
    pub async fn send(&mut self, frame: &GatewayFrame) -> Result<()> {
        self.stream.send(Message::Text(frame.to_json()?)).await?;
        Ok(())
    }

    pub async fn hello(&mut self, interval_ms: u64) -> Result<()> {
        self.send(&GatewayFrame::hello(interval_ms)).await
    }

    pub async fn dispatch(&mut self, name: &str, seq: u64, data: Value) -> Result<()> {
        self.send(&GatewayFrame::dispatch(name, seq, data)).await
    }

    pub async fn ready(&mut self, session_id: &str, seq: u64, resume_url: &str) -> Result<()> {
        let data = json!({
            "v": 10,
            "session_id": session_id,
            "resume_gateway_url": resume_url,
            "user": {"id": "1", "username": "cord-test"}
        });
        self.dispatch("READY", seq, data).await
    }

    /// Close the socket with a gateway close code
    pub async fn close(&mut self, code: u16) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        self.stream.close(Some(frame)).await?;
        Ok(())
    }

    /// Next frame from the client
    pub async fn recv(&mut self) -> Result<GatewayFrame> {
        loop {
            let message = tokio::time::timeout(WAIT, self.stream.next())
                .await
                .map_err(|_| anyhow!("client sent nothing within {WAIT:?}"))?
                .ok_or_else(|| anyhow!("client hung up"))??;
            match message {
                Message::Text(text) => return Ok(GatewayFrame::from_json(&text)?),
                Message::Close(frame) => bail!("client closed the connection: {frame:?}"),
                _ => {}
            }
        }
    }

    /// Next frame with the given opcode, acknowledging heartbeats on the way
    pub async fn expect(&mut self, op: OpCode) -> Result<GatewayFrame> {
        loop {
            let frame = self.recv().await?;
            if frame.op == op {
                return Ok(frame);
            }
            if frame.op != OpCode::Heartbeat {
                bail!("expected {op}, got {frame}");
            }
            self.send(&GatewayFrame::heartbeat_ack()).await?;
        }
    }

    /// Read until the client closes; returns its close code
    pub async fn closed_with(&mut self) -> Result<Option<u16>> {
        loop {
            let message = tokio::time::timeout(WAIT, self.stream.next())
                .await
                .map_err(|_| anyhow!("client did not close within {WAIT:?}"))?;
            match message {
                Some(Ok(Message::Close(frame))) => return Ok(frame.map(|f| f.code.into())),
                Some(Ok(_)) => {}
                Some(Err(e)) => bail!("socket failed before close: {e}"),
                None => return Ok(None),
            }
        }
    }
}
