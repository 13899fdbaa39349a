use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;

use super::handler::{handler_fn, EventHandler, HandlerError};
use super::GatewayEvent;
use crate::connection::GatewayHandle;

/// Registration name that receives every event, after the named handlers
pub const WILDCARD: &str = "*";

/// Returned by registration; pass to [`EventDispatcher::unregister`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub invoked: usize,
    pub failed: usize,
}

type Registration = (HandlerId, Arc<dyn EventHandler>);

/// Routing table from event name to handlers
#[derive(Default)]
pub struct EventDispatcher {
    handlers: DashMap<String, Vec<Registration>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `event` (or [`WILDCARD`])
    pub fn register(&self, event: impl Into<String>, handler: impl EventHandler) -> HandlerId {
        self.register_arc(event, Arc::new(handler))
    }

    pub fn register_arc(&self, event: impl Into<String>, handler: Arc<dyn EventHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let event = event.into();
        tracing::debug!(event = %event, handler_id = id.0, "Handler registered");
        self.handlers.entry(event).or_default().push((id, handler));
        id
    }

    /// Register an async closure
    pub fn on<F, Fut>(&self, event: impl Into<String>, f: F) -> HandlerId
    where
        F: Fn(GatewayHandle, GatewayEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(event, handler_fn(f))
    }

    /// Remove a handler; returns whether it was registered
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut removed = false;
        for mut entry in self.handlers.iter_mut() {
            let before = entry.len();
            entry.retain(|(existing, _)| *existing != id);
            if entry.len() != before {
                removed = true;
                break;
            }
        }
        if removed {
            self.handlers.retain(|_, list| !list.is_empty());
            tracing::debug!(handler_id = id.0, "Handler unregistered");
        }
        removed
    }

    /// Handlers registered under exactly this name
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, |list| list.len())
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn snapshot(&self, event: &str) -> Vec<Arc<dyn EventHandler>> {
        let mut selected: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .get(event)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        if event != WILDCARD {
            if let Some(list) = self.handlers.get(WILDCARD) {
                selected.extend(list.iter().map(|(_, h)| Arc::clone(h)));
            }
        }
        selected
    }

    /// Run every handler for the event in registration order
    ///
    /// A handler that errors or panics is logged and skipped; the rest still
    /// run. The table is not locked while handlers execute, so a handler may
    /// register or unregister others.
    pub async fn dispatch(&self, gateway: &GatewayHandle, event: &GatewayEvent) -> DispatchSummary {
        let handlers = self.snapshot(&event.name);
        let mut summary = DispatchSummary {
            invoked: handlers.len(),
            failed: 0,
        };

        for (index, handler) in handlers.iter().enumerate() {
            let outcome = AssertUnwindSafe(handler.handle(gateway, event))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    summary.failed += 1;
                    tracing::warn!(
                        event = %event.name,
                        seq = ?event.sequence,
                        handler = index,
                        error = %e,
                        "Event handler failed"
                    );
                }
                Err(panic) => {
                    summary.failed += 1;
                    tracing::warn!(
                        event = %event.name,
                        seq = ?event.sequence,
                        handler = index,
                        panic = %panic_message(panic.as_ref()),
                        "Event handler panicked"
                    );
                }
            }
        }

        summary
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("events", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::HeartbeatController;
    use async_trait::async_trait;
    use cord_core::ShardId;
    use parking_lot::Mutex;
    use serde_json::json;

    fn gateway() -> GatewayHandle {
        GatewayHandle::new(ShardId::ONE, Arc::new(HeartbeatController::new())).0
    }

    fn event(name: &str) -> GatewayEvent {
        GatewayEvent::new(name, Some(1), json!({}))
    }

    /// Appends its tag to a shared log
    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, _: &GatewayHandle, _: &GatewayEvent) -> Result<(), HandlerError> {
            self.log.lock().push(self.tag);
            Ok(())
        }
    }

    struct Panicker;

    #[async_trait]
    impl EventHandler for Panicker {
        async fn handle(&self, _: &GatewayHandle, _: &GatewayEvent) -> Result<(), HandlerError> {
            panic!("handler bug")
        }
    }

    fn recorder(tag: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Recorder {
        Recorder {
            tag,
            log: Arc::clone(log),
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.register("MESSAGE_CREATE", recorder("a", &log));
        dispatcher.register("MESSAGE_CREATE", recorder("b", &log));
        dispatcher.register("GUILD_CREATE", recorder("other", &log));
        dispatcher.register("MESSAGE_CREATE", recorder("c", &log));

        let summary = dispatcher.dispatch(&gateway(), &event("MESSAGE_CREATE")).await;
        assert_eq!(summary, DispatchSummary { invoked: 3, failed: 0 });
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_others() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.register("READY", recorder("first", &log));
        dispatcher.on("READY", |_, _| async { Err::<(), HandlerError>("boom".into()) });
        dispatcher.register("READY", Panicker);
        dispatcher.register("READY", recorder("last", &log));

        let summary = dispatcher.dispatch(&gateway(), &event("READY")).await;
        assert_eq!(summary, DispatchSummary { invoked: 4, failed: 2 });
        assert_eq!(*log.lock(), vec!["first", "last"]);
    }

    #[tokio::test]
    async fn test_wildcard_runs_after_named_handlers() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.register(WILDCARD, recorder("any", &log));
        dispatcher.register("TYPING_START", recorder("named", &log));

        dispatcher.dispatch(&gateway(), &event("TYPING_START")).await;
        dispatcher.dispatch(&gateway(), &event("UNHANDLED")).await;
        assert_eq!(*log.lock(), vec!["named", "any", "any"]);
    }

    #[tokio::test]
    async fn test_unregister() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = dispatcher.register("READY", recorder("a", &log));
        dispatcher.register("READY", recorder("b", &log));

        assert!(dispatcher.unregister(first));
        assert!(!dispatcher.unregister(first));
        assert_eq!(dispatcher.handler_count("READY"), 1);

        dispatcher.dispatch(&gateway(), &event("READY")).await;
        assert_eq!(*log.lock(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_unregister_last_handler_removes_entry() {
        let dispatcher = EventDispatcher::new();
        let id = dispatcher.on("READY", |_, _| async { Ok(()) });
        assert!(!dispatcher.is_empty());

        dispatcher.unregister(id);
        assert!(dispatcher.is_empty());
    }

    #[tokio::test]
    async fn test_closure_receives_event() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        dispatcher.on("MESSAGE_CREATE", move |_, event| {
            let sink = Arc::clone(&sink);
            async move {
                *sink.lock() = Some(event.data["content"].clone());
                Ok(())
            }
        });

        let message = GatewayEvent::new("MESSAGE_CREATE", Some(9), json!({"content": "hi"}));
        dispatcher.dispatch(&gateway(), &message).await;
        assert_eq!(*seen.lock(), Some(json!("hi")));
    }

    #[tokio::test]
    async fn test_no_handlers() {
        let dispatcher = EventDispatcher::new();
        let summary = dispatcher.dispatch(&gateway(), &event("READY")).await;
        assert_eq!(summary, DispatchSummary::default());
    }
}
