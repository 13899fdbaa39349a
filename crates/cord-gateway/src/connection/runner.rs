//! Connection state machine
//!
//! One task owns the transport, the session and the heartbeat. It reads
//! frames, routes them by opcode and decides when to reconnect. Dispatch
//! events are forwarded in received order to a second task that runs the
//! consumer handlers, so a slow handler never delays a heartbeat ack.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cord_common::ClientConfig;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use super::handle::HandleParts;
use super::reconnect::ReconnectPolicy;
use super::{
    ConnectionState, Connector, GatewayDiscovery, GatewayHandle, Transport, TransportEvent,
    WsConnector,
};
use crate::error::GatewayError;
use crate::events::{EventDispatcher, GatewayEvent};
use crate::handshake::{self, HandshakeKind};
use crate::heartbeat::HeartbeatController;
use crate::protocol::{CloseCode, GatewayFrame, OpCode};
use crate::session::{SequenceUpdate, SessionState};

/// Close code sent when dropping a socket we intend to resume
const RESUMABLE_CLOSE: u16 = 4900;
/// Normal closure; ends the session on the server
const NORMAL_CLOSE: u16 = 1000;
/// Frames from the heartbeat task waiting for the writer
const OUTBOUND_BUFFER: usize = 16;
/// Upper bound on a best-effort close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);
/// Undelivered events before the pump warns about slow handlers
const EVENT_BACKLOG_WARN: usize = 1_000;

/// Builder for a gateway connection
pub struct GatewayConnection {
    config: Arc<ClientConfig>,
    discovery: Arc<dyn GatewayDiscovery>,
    connector: Arc<dyn Connector>,
    events: Arc<EventDispatcher>,
}

impl GatewayConnection {
    pub fn new(
        config: Arc<ClientConfig>,
        discovery: Arc<dyn GatewayDiscovery>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            config,
            discovery,
            connector: Arc::new(WsConnector),
            events,
        }
    }

    /// Use a different transport implementation
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Discover the gateway URL, open the socket and spawn the connection loop
    ///
    /// Returns once the socket is open; the handshake continues in the
    /// background. Fails with [`GatewayError::Connection`] when the URL cannot
    /// be obtained or the socket cannot be opened. Nothing is left running on
    /// failure, so the caller may simply try again.
    pub async fn start(self) -> Result<GatewayHandle, GatewayError> {
        let shard = self.config.shard;
        let heartbeat = Arc::new(HeartbeatController::new());
        let (handle, parts) = GatewayHandle::new(shard, Arc::clone(&heartbeat));
        handle.set_state(ConnectionState::Connecting);

        let (session, transport) = match self.open_initial().await {
            Ok(opened) => opened,
            Err(e) => {
                handle.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let span = tracing::info_span!("gateway", shard = %shard);

        tokio::spawn(
            pump_events(Arc::clone(&self.events), handle.clone(), event_rx).instrument(span.clone()),
        );

        let runner = Runner {
            reconnect: ReconnectPolicy::new(&self.config.gateway),
            hello_timeout: Duration::from_millis(self.config.gateway.hello_timeout_ms),
            config: self.config,
            connector: self.connector,
            handle: handle.clone(),
            heartbeat,
            session,
            events: event_tx,
            parts,
        };
        handle
            .attach(tokio::spawn(runner.run(transport).instrument(span)))
            .await;

        Ok(handle)
    }

    async fn open_initial(&self) -> Result<(SessionState, Box<dyn Transport>), GatewayError> {
        let info = self.discovery.discover().await?;
        let shard = self.config.shard;

        if info.shards > shard.count() {
            tracing::warn!(
                recommended = info.shards,
                configured = shard.count(),
                "Gateway recommends more shards than configured"
            );
        }
        tracing::debug!(
            total = info.session_start_limit.total,
            remaining = info.session_start_limit.remaining,
            reset_after_ms = info.session_start_limit.reset_after,
            max_concurrency = info.session_start_limit.max_concurrency,
            "Session start limit"
        );

        let mut session = SessionState::new();
        session.set_gateway_url(self.config.gateway_query(&info.url));
        let url = session.gateway_url().unwrap_or_default().to_string();

        tracing::info!(shard = %shard, url = %url, "Connecting to gateway");
        let transport = self.connector.connect(&url).await?;
        Ok((session, transport))
    }
}

/// Why a connection attempt ended without stopping the loop
#[derive(Debug)]
enum Reason {
    /// Server sent op 7
    Requested,
    Zombie,
    InvalidSession { resumable: bool },
    Closed(Option<u16>),
    Failed(GatewayError),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "server requested reconnect"),
            Self::Zombie => write!(f, "{}", GatewayError::ZombieConnection),
            Self::InvalidSession { resumable } => {
                write!(f, "{}", GatewayError::SessionInvalidated { resumable: *resumable })
            }
            Self::Closed(Some(code)) => match CloseCode::from_u16(*code) {
                Some(known) => write!(f, "closed with {known}"),
                None => write!(f, "closed with code {code}"),
            },
            Self::Closed(None) => write!(f, "connection closed"),
            Self::Failed(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug)]
enum Exit {
    Stopped,
    Fatal(GatewayError),
    Reconnect(Reason),
}

/// Per-socket bookkeeping
struct Attempt {
    outbound: mpsc::Sender<GatewayFrame>,
    zombie: Option<oneshot::Sender<()>>,
    hello_seen: bool,
    handshake: Option<HandshakeKind>,
}

struct Runner {
    config: Arc<ClientConfig>,
    connector: Arc<dyn Connector>,
    handle: GatewayHandle,
    heartbeat: Arc<HeartbeatController>,
    session: SessionState,
    events: mpsc::UnboundedSender<GatewayEvent>,
    parts: HandleParts,
    reconnect: ReconnectPolicy,
    hello_timeout: Duration,
}

impl Runner {
    async fn run(mut self, first: Box<dyn Transport>) -> Result<(), GatewayError> {
        let mut next = Some(first);

        let result = loop {
            let transport = match next.take() {
                Some(transport) => transport,
                None => match self.open().await {
                    Ok(transport) => transport,
                    Err(GatewayError::Shutdown) => break Ok(()),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to open gateway connection");
                        match self.pause(Reason::Failed(e)).await {
                            Ok(()) => continue,
                            Err(e) => break Err(e),
                        }
                    }
                },
            };

            match self.drive(transport).await {
                Exit::Stopped => break Ok(()),
                Exit::Fatal(e) => break Err(e),
                Exit::Reconnect(reason) => {
                    if let Err(e) = self.pause(reason).await {
                        break Err(e);
                    }
                }
            }
        };

        self.heartbeat.shutdown();
        self.handle.set_state(ConnectionState::Disconnected);

        match result {
            Err(GatewayError::Shutdown) | Ok(()) => {
                tracing::info!("Gateway connection stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Gateway connection ended");
                Err(e)
            }
        }
    }

    /// Move to `Reconnecting` and wait before the next attempt
    async fn pause(&mut self, reason: Reason) -> Result<(), GatewayError> {
        self.handle.set_state(ConnectionState::Reconnecting);

        let delay = if matches!(reason, Reason::InvalidSession { .. }) {
            self.reconnect.after_invalid_session()
        } else {
            self.reconnect.after_failure()?
        };

        tracing::info!(
            reason = %reason,
            delay_ms = delay.as_millis() as u64,
            attempt = self.reconnect.failures(),
            resume = self.session.can_resume(),
            "Reconnecting"
        );
        sleep_or_stop(&mut self.parts.stop, delay).await
    }

    async fn open(&mut self) -> Result<Box<dyn Transport>, GatewayError> {
        self.handle.set_state(ConnectionState::Connecting);
        let url = self
            .session
            .connect_url()
            .ok_or_else(|| GatewayError::Connection("no gateway URL".to_string()))?
            .to_string();
        tracing::info!(url = %url, resume = self.session.can_resume(), "Connecting to gateway");

        tokio::select! {
            biased;
            () = stopped(&mut self.parts.stop) => Err(GatewayError::Shutdown),
            result = self.connector.connect(&url) => result,
        }
    }

    /// Run one socket until it ends
    async fn drive(&mut self, mut transport: Box<dyn Transport>) -> Exit {
        self.handle.set_state(ConnectionState::AwaitingHello);

        let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (zombie_tx, mut zombie_rx) = oneshot::channel();
        let mut attempt = Attempt {
            outbound: outbound_tx,
            zombie: Some(zombie_tx),
            hello_seen: false,
            handshake: None,
        };
        let mut zombie_armed = true;
        let hello_deadline = tokio::time::sleep(self.hello_timeout);
        tokio::pin!(hello_deadline);

        let exit = loop {
            let live = self.handle.state().is_live();

            tokio::select! {
                biased;

                () = stopped(&mut self.parts.stop) => break Exit::Stopped,

                signal = &mut zombie_rx, if zombie_armed && attempt.hello_seen => {
                    zombie_armed = false;
                    if signal.is_ok() {
                        self.handle.set_state(ConnectionState::Zombied);
                        break Exit::Reconnect(Reason::Zombie);
                    }
                }

                Some(frame) = outbound_rx.recv() => {
                    if let Err(e) = transport.send(&frame).await {
                        break Exit::Reconnect(Reason::Failed(e));
                    }
                }

                Some(frame) = self.parts.commands.recv(), if live => {
                    tracing::debug!(op = %frame.op, "Sending consumer frame");
                    if let Err(e) = transport.send(&frame).await {
                        break Exit::Reconnect(Reason::Failed(e));
                    }
                }

                () = &mut hello_deadline, if !attempt.hello_seen => {
                    tracing::warn!(timeout_ms = self.hello_timeout.as_millis() as u64, "No hello from gateway");
                    break Exit::Reconnect(Reason::Failed(GatewayError::HelloTimeout(self.hello_timeout)));
                }

                event = transport.recv() => match event {
                    TransportEvent::Frame(frame) => {
                        if let Some(exit) = self.on_frame(frame, &mut attempt, transport.as_mut()).await {
                            break exit;
                        }
                    }
                    TransportEvent::Malformed(e) => {
                        tracing::warn!(error = %e, "Dropping undecodable frame");
                    }
                    TransportEvent::Closed(code) => break self.on_close(code),
                    TransportEvent::Error(e) => {
                        tracing::warn!(error = %e, "Gateway transport failed");
                        break Exit::Reconnect(Reason::Failed(e));
                    }
                },
            }
        };

        self.heartbeat.stop();
        let close_code = match &exit {
            Exit::Stopped => Some(NORMAL_CLOSE),
            Exit::Reconnect(Reason::Closed(_)) | Exit::Fatal(_) => None,
            Exit::Reconnect(_) => Some(RESUMABLE_CLOSE),
        };
        if let Some(code) = close_code {
            match tokio::time::timeout(CLOSE_TIMEOUT, transport.close(code)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "Close failed"),
                Err(_) => tracing::debug!("Close timed out"),
            }
        }

        exit
    }

    async fn on_frame(
        &mut self,
        frame: GatewayFrame,
        attempt: &mut Attempt,
        transport: &mut dyn Transport,
    ) -> Option<Exit> {
        match frame.op {
            OpCode::Hello => self.on_hello(&frame, attempt, transport).await,
            OpCode::HeartbeatAck => {
                self.heartbeat.on_ack();
                None
            }
            OpCode::Heartbeat => {
                tracing::debug!("Gateway requested a heartbeat");
                if self.heartbeat.beat_now() {
                    return None;
                }
                let beat = GatewayFrame::heartbeat(self.session.sequence());
                transport
                    .send(&beat)
                    .await
                    .err()
                    .map(|e| Exit::Reconnect(Reason::Failed(e)))
            }
            OpCode::Reconnect => {
                tracing::info!("Gateway requested reconnect");
                Some(Exit::Reconnect(Reason::Requested))
            }
            OpCode::InvalidSession => {
                let resumable = frame.as_invalid_session().unwrap_or(false);
                tracing::warn!(resumable, "Session invalidated");
                if !resumable {
                    self.forget_session();
                }
                Some(Exit::Reconnect(Reason::InvalidSession { resumable }))
            }
            OpCode::Dispatch => self.on_dispatch(frame, attempt),
            OpCode::Identify
            | OpCode::PresenceUpdate
            | OpCode::VoiceStateUpdate
            | OpCode::Resume
            | OpCode::RequestGuildMembers => {
                tracing::warn!(
                    error = %GatewayError::ProtocolViolation(format!("server sent client opcode {}", frame.op)),
                    "Ignoring frame"
                );
                None
            }
        }
    }

    async fn on_hello(
        &mut self,
        frame: &GatewayFrame,
        attempt: &mut Attempt,
        transport: &mut dyn Transport,
    ) -> Option<Exit> {
        if attempt.hello_seen {
            tracing::warn!("Ignoring repeated hello");
            return None;
        }
        let interval = match frame.as_hello() {
            Some(hello) if hello.heartbeat_interval > 0 => {
                Duration::from_millis(hello.heartbeat_interval)
            }
            _ => {
                return Some(Exit::Reconnect(Reason::Failed(GatewayError::ProtocolViolation(
                    "hello without a usable heartbeat interval".to_string(),
                ))));
            }
        };
        attempt.hello_seen = true;

        let zombie = attempt.zombie.take()?;
        if self
            .heartbeat
            .start(
                interval,
                self.session.sequence_handle(),
                attempt.outbound.clone(),
                zombie,
            )
            .is_err()
        {
            return Some(Exit::Stopped);
        }

        let (kind, handshake) = handshake::handshake(&self.config, &self.session);
        attempt.handshake = Some(kind);
        self.handle.set_state(ConnectionState::Handshaking(kind));
        tracing::info!(
            handshake = %kind,
            session_id = ?self.session.session_id(),
            seq = ?self.session.sequence(),
            "Sending handshake"
        );

        transport
            .send(&handshake)
            .await
            .err()
            .map(|e| Exit::Reconnect(Reason::Failed(e)))
    }

    fn on_dispatch(&mut self, frame: GatewayFrame, attempt: &Attempt) -> Option<Exit> {
        let Some(name) = frame.event_name().map(str::to_string) else {
            tracing::warn!("Dropping dispatch without an event name");
            return None;
        };

        match (attempt.handshake, self.handle.state()) {
            (None, _) => {
                tracing::warn!(event = %name, "Dropping dispatch received before hello");
                return None;
            }
            (Some(HandshakeKind::Identify), ConnectionState::Handshaking(_)) if name != "READY" => {
                tracing::warn!(
                    error = %GatewayError::ProtocolViolation(format!("{name} before READY")),
                    "Dropping dispatch"
                );
                return None;
            }
            _ => {}
        }

        if name == "READY" {
            match frame.as_ready() {
                Ok(ready) => {
                    let resume_url = ready
                        .resume_gateway_url
                        .as_deref()
                        .map(|url| self.config.gateway_query(url));
                    self.session.establish(ready.session_id.clone(), resume_url);
                    self.handle.set_session_id(Some(ready.session_id.clone()));
                    self.reconnect.connected();
                    self.handle.set_state(ConnectionState::Ready);
                    tracing::info!(
                        session_id = %ready.session_id,
                        user = ?ready.user.as_ref().map(|u| u.username.as_str()),
                        "Gateway ready"
                    );
                }
                Err(e) => {
                    return Some(Exit::Reconnect(Reason::Failed(GatewayError::Decode(e))));
                }
            }
        } else if name == "RESUMED" && attempt.handshake == Some(HandshakeKind::Resume) {
            self.reconnect.connected();
            self.handle.set_state(ConnectionState::Ready);
            tracing::info!(
                session_id = ?self.session.session_id(),
                seq = ?self.session.sequence(),
                "Session resumed"
            );
        }

        if let Some(seq) = frame.s {
            match self.session.advance(seq) {
                SequenceUpdate::Stale { current } => {
                    tracing::debug!(event = %name, seq, current, "Dropping stale dispatch");
                    return None;
                }
                SequenceUpdate::Advanced { previous } => {
                    if let Some(previous) = previous {
                        if seq > previous + 1 {
                            tracing::debug!(event = %name, seq, previous, "Sequence gap");
                        }
                    }
                }
            }
        }

        if self.handle.state() == ConnectionState::Ready {
            self.handle.set_state(ConnectionState::SteadyState);
        }

        tracing::trace!(event = %name, seq = ?frame.s, "Dispatch");
        let event = GatewayEvent::new(name, frame.s, frame.d);
        if self.events.send(event).is_err() {
            tracing::debug!("Event pump is gone");
        }
        None
    }

    fn on_close(&mut self, code: Option<u16>) -> Exit {
        match code.and_then(CloseCode::from_u16) {
            Some(known) if known.is_fatal() => {
                tracing::error!(code = %known, "Gateway closed the connection");
                Exit::Fatal(GatewayError::FatalClose(known))
            }
            Some(known) => {
                if known.invalidates_session() {
                    self.forget_session();
                }
                tracing::warn!(code = %known, "Gateway closed the connection");
                Exit::Reconnect(Reason::Closed(code))
            }
            None => {
                tracing::info!(code = ?code, "Gateway connection closed");
                Exit::Reconnect(Reason::Closed(code))
            }
        }
    }

    fn forget_session(&mut self) {
        self.session.clear();
        self.handle.set_session_id(None);
    }
}

/// Resolves once the stop flag is set
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

async fn sleep_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> Result<(), GatewayError> {
    tokio::select! {
        biased;
        () = stopped(stop) => Err(GatewayError::Shutdown),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Run handlers for each event, one event at a time
///
/// The queue is unbounded so the reader never waits on handlers; a backlog
/// past [`EVENT_BACKLOG_WARN`] is logged instead.
async fn pump_events(
    dispatcher: Arc<EventDispatcher>,
    handle: GatewayHandle,
    mut events: mpsc::UnboundedReceiver<GatewayEvent>,
) {
    let mut backlog = Backlog::new(EVENT_BACKLOG_WARN);
    while let Some(event) = events.recv().await {
        if backlog.observe(events.len()) {
            tracing::warn!(
                queued = events.len(),
                "Event handlers are falling behind the gateway"
            );
        }
        let summary = dispatcher.dispatch(&handle, &event).await;
        if summary.invoked == 0 {
            tracing::trace!(event = %event.name, "No handlers registered");
        }
    }
}

/// Edge-triggered queue depth alarm
///
/// Fires once when the depth reaches the threshold and re-arms after it
/// drains below half of it.
#[derive(Debug)]
struct Backlog {
    threshold: usize,
    raised: bool,
}

impl Backlog {
    fn new(threshold: usize) -> Self {
        Self {
            threshold,
            raised: false,
        }
    }

    fn observe(&mut self, depth: usize) -> bool {
        if depth >= self.threshold {
            let fire = !self.raised;
            self.raised = true;
            fire
        } else {
            if depth < self.threshold / 2 {
                self.raised = false;
            }
            false
        }
    }
}
