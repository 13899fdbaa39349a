//! Serialized request dispatcher
//!
//! A single background worker drains a FIFO queue. A 429 puts the same
//! request back at the front of the queue and pauses the worker for the
//! advertised delay, so requests leave in enqueue order except for that
//! retry.

mod pending;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::RestError;
use crate::executor::{HttpExecutor, HttpOutcome};
use crate::route::{RestRequest, Route};

pub(crate) use pending::PendingRequest;
pub use pending::ResponseHandle;

/// Outbound request dispatcher
///
/// Enqueueing is safe from any task. Requests submitted after
/// [`stop`](Self::stop) complete immediately with [`RestError::Shutdown`].
pub struct RequestDispatcher {
    queue: mpsc::UnboundedSender<PendingRequest>,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RequestDispatcher {
    /// Spawn the worker on the current runtime
    ///
    /// `requests_per_second` enforces a minimum spacing between requests;
    /// `None` sends as fast as responses allow.
    pub fn spawn(executor: Arc<dyn HttpExecutor>, requests_per_second: Option<u32>) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let limiter = requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        let worker = Worker {
            executor,
            limiter,
            queue: rx,
            front: VecDeque::new(),
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            queue,
            shutdown,
            running: AtomicBool::new(true),
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queue a request
    pub fn submit(&self, route: Route, body: Option<Value>) -> ResponseHandle {
        self.enqueue(RestRequest::new(route, body), None)
    }

    /// Queue a request that gives up on rate limits outlasting `max_wait`
    ///
    /// When a 429 would push completion past the deadline the handle resolves
    /// to [`RestError::RateLimited`] instead of waiting.
    pub fn submit_with_deadline(
        &self,
        route: Route,
        body: Option<Value>,
        max_wait: Duration,
    ) -> ResponseHandle {
        self.enqueue(RestRequest::new(route, body), Some(Instant::now() + max_wait))
    }

    fn enqueue(&self, request: RestRequest, deadline: Option<Instant>) -> ResponseHandle {
        let (pending, handle) = PendingRequest::new(request, deadline);

        if !self.is_running() {
            pending.complete(Err(RestError::Shutdown));
            return handle;
        }
        if let Err(mpsc::error::SendError(pending)) = self.queue.send(pending) {
            pending.complete(Err(RestError::Shutdown));
        }
        handle
    }

    /// Stop the worker and fail every queued request with [`RestError::Shutdown`]
    ///
    /// Idempotent. A request in flight when `stop` is called is abandoned and
    /// also fails with `Shutdown`.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Stopping request dispatcher");
        }
        self.shutdown.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait for the worker task to exit
    pub async fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Request dispatcher worker failed");
            }
        }
    }
}

impl Drop for RequestDispatcher {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Background worker owning the queue
struct Worker {
    executor: Arc<dyn HttpExecutor>,
    limiter: Option<DefaultDirectRateLimiter>,
    queue: mpsc::UnboundedReceiver<PendingRequest>,
    /// Requests re-queued after a 429; always drained before `queue`
    front: VecDeque<PendingRequest>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        tracing::debug!("Request dispatcher started");

        while let Some(pending) = self.next().await {
            if pending.is_abandoned() {
                tracing::trace!(route = %pending.request.route, "Skipping abandoned request");
                continue;
            }
            if !self.process(pending).await {
                break;
            }
        }

        self.drain();
    }

    async fn next(&mut self) -> Option<PendingRequest> {
        if *self.shutdown.borrow() {
            return None;
        }
        if let Some(pending) = self.front.pop_front() {
            return Some(pending);
        }

        tokio::select! {
            biased;
            _ = self.shutdown.changed() => None,
            pending = self.queue.recv() => pending,
        }
    }

    /// Send one request. Returns `false` when shutdown interrupted it.
    async fn process(&mut self, pending: PendingRequest) -> bool {
        if let Some(limiter) = &self.limiter {
            let ready = tokio::select! {
                biased;
                _ = self.shutdown.changed() => false,
                () = limiter.until_ready() => true,
            };
            if !ready {
                self.front.push_front(pending);
                return false;
            }
        }

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.changed() => None,
            result = self.executor.execute(&pending.request) => Some(result),
        };
        let Some(outcome) = outcome else {
            self.front.push_front(pending);
            return false;
        };

        match outcome {
            Ok(HttpOutcome::Success(body)) => {
                tracing::debug!(route = %pending.request.route, "Request completed");
                pending.complete(Ok(body));
                true
            }
            Ok(HttpOutcome::RateLimited(limit)) => {
                tracing::warn!(
                    route = %pending.request.route,
                    retry_after_ms = limit.retry_after.as_millis() as u64,
                    global = limit.global,
                    "Rate limited, pausing dispatcher"
                );

                let past_deadline = pending
                    .deadline
                    .is_some_and(|deadline| Instant::now() + limit.retry_after > deadline);
                if past_deadline {
                    pending.complete(Err(RestError::RateLimited {
                        retry_after: limit.retry_after,
                    }));
                    return true;
                }

                self.front.push_front(pending);
                tokio::select! {
                    biased;
                    _ = self.shutdown.changed() => false,
                    () = tokio::time::sleep(limit.retry_after) => true,
                }
            }
            Err(e) => {
                tracing::warn!(route = %pending.request.route, error = %e, "Request failed");
                pending.complete(Err(e));
                true
            }
        }
    }

    fn drain(&mut self) {
        self.queue.close();

        let mut failed = 0usize;
        for pending in self.front.drain(..) {
            pending.complete(Err(RestError::Shutdown));
            failed += 1;
        }
        while let Ok(pending) = self.queue.try_recv() {
            pending.complete(Err(RestError::Shutdown));
            failed += 1;
        }

        tracing::info!(failed, "Request dispatcher stopped");
    }
}
