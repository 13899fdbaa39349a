//! Consumer handle to a running connection

use std::sync::Arc;
use std::time::Duration;

use cord_core::{Presence, ShardId};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::ConnectionState;
use crate::error::GatewayError;
use crate::heartbeat::HeartbeatController;
use crate::protocol::GatewayFrame;

/// Frames queued by consumers before the loop writes them
const COMMAND_BUFFER: usize = 32;

/// Receiving ends owned by the connection loop
pub(crate) struct HandleParts {
    pub(crate) commands: mpsc::Receiver<GatewayFrame>,
    pub(crate) stop: watch::Receiver<bool>,
}

struct HandleInner {
    shard: ShardId,
    commands: mpsc::Sender<GatewayFrame>,
    state: watch::Sender<ConnectionState>,
    stop: watch::Sender<bool>,
    heartbeat: Arc<HeartbeatController>,
    session_id: RwLock<Option<String>>,
    task: Mutex<Option<JoinHandle<Result<(), GatewayError>>>>,
}

/// Cloneable handle to one gateway connection
///
/// Handed to event handlers and returned by
/// [`GatewayConnection::start`](super::GatewayConnection::start).
#[derive(Clone)]
pub struct GatewayHandle {
    inner: Arc<HandleInner>,
}

impl GatewayHandle {
    pub(crate) fn new(shard: ShardId, heartbeat: Arc<HeartbeatController>) -> (Self, HandleParts) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let handle = Self {
            inner: Arc::new(HandleInner {
                shard,
                commands: commands_tx,
                state: state_tx,
                stop: stop_tx,
                heartbeat,
                session_id: RwLock::new(None),
                task: Mutex::new(None),
            }),
        };
        let parts = HandleParts {
            commands: commands_rx,
            stop: stop_rx,
        };
        (handle, parts)
    }

    pub(crate) async fn attach(&self, task: JoinHandle<Result<(), GatewayError>>) {
        *self.inner.task.lock().await = Some(task);
    }

    /// Stop the connection
    ///
    /// Signals the loop, stops the heartbeat synchronously and reports
    /// `Disconnected`. Safe to call from any task, any number of times.
    pub fn stop(&self) {
        let already = self.inner.stop.send_replace(true);
        self.inner.heartbeat.shutdown();
        self.inner.state.send_replace(ConnectionState::Disconnected);
        if !already {
            tracing::info!(shard = %self.inner.shard, "Gateway stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stop.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the connection reaches a state matching `predicate`
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&ConnectionState) -> bool,
    ) -> Result<ConnectionState, GatewayError> {
        let mut rx = self.subscribe();
        let state = rx
            .wait_for(predicate)
            .await
            .map_err(|_| GatewayError::Shutdown)?;
        Ok(*state)
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        if self.is_stopped() && next != ConnectionState::Disconnected {
            return;
        }
        let previous = self.inner.state.send_replace(next);
        if previous != next {
            tracing::info!(
                shard = %self.inner.shard,
                from = %previous,
                to = %next,
                "Gateway state changed"
            );
        }
    }

    /// Queue a frame on the live session
    ///
    /// Fails with [`GatewayError::NotConnected`] unless the state is `Ready`
    /// or `SteadyState`.
    pub async fn send(&self, frame: GatewayFrame) -> Result<(), GatewayError> {
        if self.is_stopped() {
            return Err(GatewayError::Shutdown);
        }
        if !self.state().is_live() {
            return Err(GatewayError::NotConnected);
        }
        self.inner
            .commands
            .send(frame)
            .await
            .map_err(|_| GatewayError::Shutdown)
    }

    /// Send a presence update (op 3)
    pub async fn update_presence(&self, presence: &Presence) -> Result<(), GatewayError> {
        self.send(GatewayFrame::presence_update(presence)).await
    }

    /// Heartbeat round trip of the last acknowledged beat
    pub fn latency(&self) -> Option<Duration> {
        self.inner.heartbeat.latency()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id.read().clone()
    }

    pub(crate) fn set_session_id(&self, session_id: Option<String>) {
        *self.inner.session_id.write() = session_id;
    }

    pub fn shard(&self) -> ShardId {
        self.inner.shard
    }

    /// Wait for the connection loop to finish
    ///
    /// Returns the terminal error for fatal closes or exhausted reconnects,
    /// `Ok(())` after [`stop`](Self::stop). Cancel-safe: dropping the future
    /// leaves the task in place for the next caller. Only the caller that
    /// sees the task complete gets its result; later calls return `Ok(())`.
    pub async fn join(&self) -> Result<(), GatewayError> {
        let mut slot = self.inner.task.lock().await;
        let Some(task) = slot.as_mut() else {
            return Ok(());
        };
        let outcome = task.await;
        *slot = None;
        outcome.map_err(|e| GatewayError::Connection(format!("connection task failed: {e}")))?
    }
}

impl std::fmt::Debug for GatewayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayHandle")
            .field("shard", &self.inner.shard)
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish()
    }
}
