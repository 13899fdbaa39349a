//! Client facade

use std::future::Future;
use std::sync::Arc;

use cord_common::ClientConfig;
use cord_gateway::{
    ConnectionState, Connector, EventDispatcher, EventHandler, GatewayConnection, GatewayDiscovery,
    GatewayEvent, GatewayHandle, HandlerError, HandlerId, StaticDiscovery,
};
use cord_rest::RestClient;
use parking_lot::Mutex;

use crate::error::{ClientError, ClientResult};

/// A bot client: one gateway connection plus the REST dispatcher
///
/// Handlers may be registered before or after [`start`](Self::start); the
/// event table is shared with the running connection.
pub struct Client {
    config: Arc<ClientConfig>,
    rest: RestClient,
    events: Arc<EventDispatcher>,
    connector: Option<Arc<dyn Connector>>,
    gateway: Mutex<Option<GatewayHandle>>,
    /// Held for the whole of [`Client::start`]
    starting: tokio::sync::Mutex<()>,
}

impl Client {
    /// Build a client from a validated configuration
    ///
    /// Must be called from within a Tokio runtime; the REST worker starts
    /// immediately.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let rest = RestClient::new(&config.rest, &config.token)?;
        Ok(Self::assemble(config, rest))
    }

    /// Build a client from `CORD_*` environment variables (and `.env`)
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Build a client around an existing REST client
    pub fn with_rest(config: ClientConfig, rest: RestClient) -> ClientResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, rest))
    }

    fn assemble(config: ClientConfig, rest: RestClient) -> Self {
        Self {
            config: Arc::new(config),
            rest,
            events: Arc::new(EventDispatcher::new()),
            connector: None,
            gateway: Mutex::new(None),
            starting: tokio::sync::Mutex::new(()),
        }
    }

    /// Use a different gateway transport
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    /// Register an async closure for an event name (`"*"` for every event)
    pub fn on<F, Fut>(&self, event: impl Into<String>, f: F) -> HandlerId
    where
        F: Fn(GatewayHandle, GatewayEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.events.on(event, f)
    }

    pub fn register(&self, event: impl Into<String>, handler: impl EventHandler) -> HandlerId {
        self.events.register(event, handler)
    }

    pub fn unregister(&self, id: HandlerId) -> bool {
        self.events.unregister(id)
    }

    /// Open the gateway connection
    ///
    /// Fails with [`ClientError::AlreadyStarted`] while a previous connection
    /// is still running. Concurrent calls are serialized, so at most one of
    /// them opens a connection.
    pub async fn start(&self) -> ClientResult<GatewayHandle> {
        let _starting = self.starting.lock().await;
        if let Some(existing) = self.gateway.lock().as_ref() {
            if !existing.is_stopped() && existing.state() != ConnectionState::Disconnected {
                return Err(ClientError::AlreadyStarted);
            }
        }

        let discovery: Arc<dyn GatewayDiscovery> = match &self.config.gateway.url {
            Some(url) => Arc::new(StaticDiscovery::new(url.clone())),
            None => Arc::new(self.rest.clone()),
        };
        let mut connection =
            GatewayConnection::new(Arc::clone(&self.config), discovery, Arc::clone(&self.events));
        if let Some(connector) = &self.connector {
            connection = connection.with_connector(Arc::clone(connector));
        }

        let handle = connection.start().await?;
        tracing::info!(
            shard = %self.config.shard,
            intents = ?self.config.intents.list(),
            "Gateway connection started"
        );
        *self.gateway.lock() = Some(handle.clone());
        Ok(handle)
    }

    /// Start and wait until the connection ends
    pub async fn run(&self) -> ClientResult<()> {
        let handle = self.start().await?;
        handle.join().await?;
        Ok(())
    }

    /// Handle to the current gateway connection, if started
    pub fn gateway(&self) -> Option<GatewayHandle> {
        self.gateway.lock().clone()
    }

    /// Stop the gateway connection and the REST worker
    pub fn stop(&self) {
        if let Some(handle) = self.gateway.lock().as_ref() {
            handle.stop();
        }
        self.rest.stop();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("events", &self.events)
            .field("gateway", &self.gateway())
            .finish()
    }
}
