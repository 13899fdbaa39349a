//! In-memory transport for driving the connection loop in tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{Connector, Transport, TransportEvent};
use crate::error::GatewayError;
use crate::protocol::{GatewayFrame, OpCode};

pub(crate) fn pair() -> (Arc<MockConnector>, MockServer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = Arc::new(MockConnector {
        peers: tx,
        urls: Mutex::new(Vec::new()),
        refuse: AtomicBool::new(false),
    });
    (connector, MockServer { peers: rx })
}

pub(crate) struct MockConnector {
    peers: mpsc::UnboundedSender<MockPeer>,
    urls: Mutex<Vec<String>>,
    refuse: AtomicBool,
}

impl MockConnector {
    pub(crate) fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Every URL a connection was attempted to, refused ones included
    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, GatewayError> {
        self.urls.lock().push(url.to_string());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(GatewayError::Connection(format!("{url}: refused")));
        }

        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();
        let close_code = Arc::new(Mutex::new(None));

        let peer = MockPeer {
            to_client: to_client_tx,
            from_client: from_client_rx,
            close_code: Arc::clone(&close_code),
        };
        self.peers
            .send(peer)
            .map_err(|_| GatewayError::Connection("mock server dropped".to_string()))?;

        Ok(Box::new(MockTransport {
            inbound: to_client_rx,
            outbound: from_client_tx,
            close_code,
        }))
    }
}

pub(crate) struct MockServer {
    peers: mpsc::UnboundedReceiver<MockPeer>,
}

impl MockServer {
    pub(crate) async fn accept(&mut self) -> MockPeer {
        self.peers.recv().await.expect("connector dropped")
    }

    pub(crate) fn try_accept(&mut self) -> Option<MockPeer> {
        self.peers.try_recv().ok()
    }
}

/// Server side of one mock connection
pub(crate) struct MockPeer {
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<GatewayFrame>,
    close_code: Arc<Mutex<Option<u16>>>,
}

impl MockPeer {
    pub(crate) fn send(&self, frame: GatewayFrame) {
        self.send_event(TransportEvent::Frame(frame));
    }

    pub(crate) fn send_event(&self, event: TransportEvent) {
        let _ = self.to_client.send(event);
    }

    pub(crate) fn hello(&self, interval_ms: u64) {
        self.send(GatewayFrame::hello(interval_ms));
    }

    pub(crate) fn ready(&self, session_id: &str, seq: u64) {
        self.dispatch(
            "READY",
            seq,
            json!({
                "v": 10,
                "session_id": session_id,
                "resume_gateway_url": "ws://resume.mock",
                "user": {"id": "1", "username": "bot"}
            }),
        );
    }

    pub(crate) fn dispatch(&self, name: &str, seq: u64, data: Value) {
        self.send(GatewayFrame::dispatch(name, seq, data));
    }

    pub(crate) fn close(&self, code: u16) {
        self.send_event(TransportEvent::Closed(Some(code)));
    }

    pub(crate) async fn recv(&mut self) -> Option<GatewayFrame> {
        self.from_client.recv().await
    }

    /// Next frame with the given opcode, skipping heartbeats
    pub(crate) async fn expect(&mut self, op: OpCode) -> GatewayFrame {
        loop {
            let frame = self.recv().await.expect("client hung up");
            if frame.op == op {
                return frame;
            }
            assert_eq!(frame.op, OpCode::Heartbeat, "expected {op}, got {frame}");
        }
    }

    /// Close code the client sent, if it closed the socket
    pub(crate) fn client_close_code(&self) -> Option<u16> {
        *self.close_code.lock()
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<GatewayFrame>,
    close_code: Arc<Mutex<Option<u16>>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: &GatewayFrame) -> Result<(), GatewayError> {
        self.outbound
            .send(frame.clone())
            .map_err(|_| GatewayError::Connection("mock peer dropped".to_string()))
    }

    async fn recv(&mut self) -> TransportEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or(TransportEvent::Closed(None))
    }

    async fn close(&mut self, code: u16) -> Result<(), GatewayError> {
        *self.close_code.lock() = Some(code);
        Ok(())
    }
}
