//! Client configuration
//!
//! Loads connection parameters from environment variables (and a `.env`
//! file when present). The configuration is validated once and then shared
//! read-only by the gateway and REST layers.

use cord_core::{GatewayEncoding, Intents, Presence, ShardId, ValueError};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Client configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// Bot token, without the `Bot ` prefix
    pub token: String,
    pub intents: Intents,
    pub shard: ShardId,
    pub encoding: GatewayEncoding,
    pub api_version: u8,
    /// Member count above which a guild's offline members are not sent
    pub large_threshold: u8,
    /// Ask the gateway for zlib-compressed dispatch payloads
    pub compress: bool,
    /// Presence sent with identify
    pub presence: Presence,
    pub metadata: ClientMetadata,
    pub gateway: GatewaySettings,
    pub rest: RestSettings,
}

/// Connection properties reported in the identify payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMetadata {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for ClientMetadata {
    fn default() -> Self {
        Self {
            os: env::consts::OS.to_string(),
            browser: default_library_name(),
            device: default_library_name(),
        }
    }
}

/// Gateway connection tuning
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Fixed gateway URL; skips the discovery request when set
    pub url: Option<String>,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Consecutive failed reconnects before giving up (`None` retries forever)
    pub max_reconnect_attempts: Option<u32>,
    pub hello_timeout_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: None,
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_reconnect_attempts: None,
            hello_timeout_ms: default_hello_timeout_ms(),
        }
    }
}

/// REST dispatcher tuning
#[derive(Debug, Clone)]
pub struct RestSettings {
    /// Versioned API root, e.g. `https://discord.com/api/v10`
    pub base_url: String,
    /// Minimum request spacing; `None` disables local throttling
    pub requests_per_second: Option<u32>,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl RestSettings {
    /// Settings pointing at the public API for the given version
    #[must_use]
    pub fn for_version(api_version: u8) -> Self {
        Self {
            base_url: default_api_base_url(api_version),
            requests_per_second: Some(default_requests_per_second()),
            user_agent: default_user_agent(),
            timeout_ms: default_rest_timeout_ms(),
        }
    }
}

impl Default for RestSettings {
    fn default() -> Self {
        Self::for_version(default_api_version())
    }
}

// Default value functions
fn default_library_name() -> String {
    "cord".to_string()
}

fn default_api_version() -> u8 {
    10
}

fn default_large_threshold() -> u8 {
    250
}

fn default_api_base_url(api_version: u8) -> String {
    format!("https://discord.com/api/v{api_version}")
}

fn default_requests_per_second() -> u32 {
    50 // global limit per bot token
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot (https://github.com/seung/cord, {})",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_rest_timeout_ms() -> u64 {
    15_000
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_hello_timeout_ms() -> u64 {
    30_000
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        let api_version = default_api_version();
        Self {
            token: token.into(),
            intents: Intents::default(),
            shard: ShardId::default(),
            encoding: GatewayEncoding::default(),
            api_version,
            large_threshold: default_large_threshold(),
            compress: false,
            presence: Presence::default(),
            metadata: ClientMetadata::default(),
            gateway: GatewaySettings::default(),
            rest: RestSettings::for_version(api_version),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `CORD_TOKEN` is missing, a variable fails to parse,
    /// or the resulting configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("CORD_TOKEN").ok_or(ConfigError::MissingVar("CORD_TOKEN"))?;
        let mut config = Self::new(token);

        if let Some(raw) = lookup("CORD_INTENTS") {
            config.intents = Intents::parse(&raw)?;
        }

        let shard_id = parse_var::<u32, _>(&lookup, "CORD_SHARD_ID")?.unwrap_or(0);
        let shard_count = parse_var::<u32, _>(&lookup, "CORD_SHARD_COUNT")?.unwrap_or(1);
        config.shard = ShardId::new(shard_id, shard_count)?;

        if let Some(raw) = lookup("CORD_ENCODING") {
            config.encoding = raw.parse()?;
        }
        if let Some(version) = parse_var(&lookup, "CORD_API_VERSION")? {
            config.api_version = version;
            config.rest.base_url = default_api_base_url(version);
        }
        if let Some(threshold) = parse_var(&lookup, "CORD_LARGE_THRESHOLD")? {
            config.large_threshold = threshold;
        }
        if let Some(status) = lookup("CORD_PRESENCE_STATUS") {
            config.presence.status = status.parse()?;
        }

        config.gateway.url = lookup("CORD_GATEWAY_URL");
        if let Some(base) = parse_var(&lookup, "CORD_BACKOFF_BASE_MS")? {
            config.gateway.backoff_base_ms = base;
        }
        if let Some(max) = parse_var(&lookup, "CORD_BACKOFF_MAX_MS")? {
            config.gateway.backoff_max_ms = max;
        }
        config.gateway.max_reconnect_attempts =
            parse_var(&lookup, "CORD_MAX_RECONNECT_ATTEMPTS")?;
        if let Some(timeout) = parse_var(&lookup, "CORD_HELLO_TIMEOUT_MS")? {
            config.gateway.hello_timeout_ms = timeout;
        }

        if let Some(base_url) = lookup("CORD_API_BASE_URL") {
            config.rest.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(rps) = parse_var::<u32, _>(&lookup, "CORD_REQUESTS_PER_SECOND")? {
            // 0 turns local throttling off
            config.rest.requests_per_second = (rps > 0).then_some(rps);
        }
        if let Some(timeout) = parse_var(&lookup, "CORD_REST_TIMEOUT_MS")? {
            config.rest.timeout_ms = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check construction-time invariants
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        if !self.encoding.is_supported() {
            return Err(ConfigError::UnsupportedEncoding(self.encoding));
        }
        if !(50..=250).contains(&self.large_threshold) {
            return Err(ConfigError::InvalidValue(
                "large_threshold",
                format!("{} is outside 50..=250", self.large_threshold),
            ));
        }
        if self.gateway.backoff_base_ms > self.gateway.backoff_max_ms {
            return Err(ConfigError::InvalidValue(
                "backoff_base_ms",
                format!(
                    "{} exceeds backoff_max_ms {}",
                    self.gateway.backoff_base_ms, self.gateway.backoff_max_ms
                ),
            ));
        }
        if self.gateway.hello_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "hello_timeout_ms",
                "must be greater than zero".to_string(),
            ));
        }
        if self.rest.requests_per_second == Some(0) {
            return Err(ConfigError::InvalidValue(
                "requests_per_second",
                "must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Gateway URL decorated with the version and encoding query
    #[must_use]
    pub fn gateway_query(&self, base: &str) -> String {
        let base = base.trim_end_matches('/');
        let separator = if base.contains('?') { '&' } else { '?' };
        format!(
            "{base}{separator}v={}&encoding={}",
            self.api_version, self.encoding
        )
    }
}

// Keep the token out of logs
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &"[redacted]")
            .field("intents", &self.intents)
            .field("shard", &self.shard)
            .field("encoding", &self.encoding)
            .field("api_version", &self.api_version)
            .field("large_threshold", &self.large_threshold)
            .field("compress", &self.compress)
            .field("gateway", &self.gateway)
            .field("rest", &self.rest)
            .finish()
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key, raw.clone()))
        })
        .transpose()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("Token must not be empty")]
    EmptyToken,

    #[error("Unsupported gateway encoding: {0}")]
    UnsupportedEncoding(GatewayEncoding),

    #[error(transparent)]
    Value(#[from] ValueError),
}
