//! Heartbeat controller
//!
//! Sends op 1 on the interval announced by Hello and watches for the ack.
//! A beat that is still unacknowledged when the next one is due means the
//! connection is a zombie; the owner is told once through a oneshot and
//! no further beats are sent.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::GatewayError;
use crate::protocol::GatewayFrame;
use crate::session::SequenceHandle;

#[derive(Debug, Default)]
struct BeatState {
    running: bool,
    shut_down: bool,
    /// Bumped on every start so a stale task never touches a newer run
    generation: u64,
    outstanding: bool,
    sent_at: Option<Instant>,
    last_ack: Option<Instant>,
    latency: Option<Duration>,
    outbound: Option<mpsc::Sender<GatewayFrame>>,
    sequence: Option<SequenceHandle>,
}

impl BeatState {
    fn send_beat(&mut self) -> bool {
        let Some(outbound) = &self.outbound else {
            return false;
        };
        let seq = self.sequence.as_ref().and_then(SequenceHandle::get);

        match outbound.try_send(GatewayFrame::heartbeat(seq)) {
            Ok(()) => {
                self.outstanding = true;
                self.sent_at = Some(Instant::now());
                tracing::trace!(seq = ?seq, "Heartbeat sent");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to queue heartbeat");
                false
            }
        }
    }

    fn halt(&mut self) {
        self.running = false;
        self.outbound = None;
        self.sequence = None;
    }
}

/// Heartbeat timer with ack tracking
///
/// Shared between the connection loop (start, ack, stop) and the public
/// handle (latency, shutdown).
#[derive(Debug, Default)]
pub struct HeartbeatController {
    state: Arc<Mutex<BeatState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start beating every `interval`
    ///
    /// The first beat is delayed by a random fraction of the interval. Any
    /// previous run is stopped first. Fails once [`shutdown`](Self::shutdown)
    /// has been called.
    pub fn start(
        &self,
        interval: Duration,
        sequence: SequenceHandle,
        outbound: mpsc::Sender<GatewayFrame>,
        zombie: oneshot::Sender<()>,
    ) -> Result<(), GatewayError> {
        self.stop();

        let generation = {
            let mut state = self.state.lock();
            if state.shut_down {
                return Err(GatewayError::Shutdown);
            }
            state.generation += 1;
            state.running = true;
            state.outstanding = false;
            state.sent_at = None;
            state.outbound = Some(outbound);
            state.sequence = Some(sequence);
            state.generation
        };

        let first_delay = interval.mul_f64(rand::thread_rng().gen::<f64>());
        tracing::debug!(
            interval_ms = interval.as_millis() as u64,
            first_delay_ms = first_delay.as_millis() as u64,
            "Heartbeat started"
        );

        let handle = tokio::spawn(beat_loop(
            Arc::clone(&self.state),
            generation,
            interval,
            first_delay,
            zombie,
        ));
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Record an ack (op 11) for the beat in flight
    pub fn on_ack(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        state.outstanding = false;
        state.last_ack = Some(now);
        if let Some(sent_at) = state.sent_at.take() {
            let latency = now.duration_since(sent_at);
            state.latency = Some(latency);
            tracing::trace!(latency_ms = latency.as_millis() as u64, "Heartbeat acknowledged");
        }
    }

    /// Send a beat immediately, outside the schedule (server op 1)
    pub fn beat_now(&self) -> bool {
        let mut state = self.state.lock();
        if !state.running {
            return false;
        }
        state.send_beat()
    }

    /// Cancel the timer
    ///
    /// Once this returns no further heartbeat frame is queued. Safe to call
    /// repeatedly or before any start.
    pub fn stop(&self) {
        self.state.lock().halt();
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    /// Stop for good; later calls to [`start`](Self::start) fail
    pub fn shutdown(&self) {
        self.state.lock().shut_down = true;
        self.stop();
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Round trip of the most recently acknowledged beat
    pub fn latency(&self) -> Option<Duration> {
        self.state.lock().latency
    }

    pub fn last_ack(&self) -> Option<Instant> {
        self.state.lock().last_ack
    }
}

impl Drop for HeartbeatController {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

async fn beat_loop(
    state: Arc<Mutex<BeatState>>,
    generation: u64,
    interval: Duration,
    first_delay: Duration,
    zombie: oneshot::Sender<()>,
) {
    tokio::time::sleep(first_delay).await;

    loop {
        {
            let mut beat = state.lock();
            if !beat.running || beat.generation != generation {
                return;
            }
            if beat.outstanding {
                beat.halt();
                drop(beat);
                tracing::warn!("Heartbeat was not acknowledged, connection is a zombie");
                let _ = zombie.send(());
                return;
            }
            beat.send_beat();
        }

        tokio::time::sleep(interval).await;
    }
}
