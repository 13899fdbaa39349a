//! Subscriber setup for applications embedding the client
//!
//! Library crates only emit `tracing` events; binaries call one of the
//! `try_init_*` functions once at startup.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Dependencies that log every frame or request at debug level
const QUIET_DEPENDENCIES: &[&str] = &[
    "tungstenite",
    "tokio_tungstenite",
    "hyper",
    "hyper_util",
    "reqwest",
    "rustls",
];

/// How log output is filtered and formatted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level for the `cord_*` crates when `RUST_LOG` is not set
    pub level: Level,
    /// One JSON object per line instead of human-readable text
    pub json: bool,
    /// Keep transport dependencies at `warn` regardless of `level`
    pub quiet_dependencies: bool,
    pub file_line: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            quiet_dependencies: true,
            file_line: false,
        }
    }
}

impl TracingConfig {
    /// Heartbeat and dispatch tracing for local debugging
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            level: Level::TRACE,
            file_line: true,
            ..Self::default()
        }
    }

    /// JSON lines for log shippers
    #[must_use]
    pub fn json() -> Self {
        Self {
            json: true,
            ..Self::default()
        }
    }

    /// Read `CORD_LOG_JSON` and `CORD_LOG_LEVEL`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    ///
    /// Unparseable values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup("CORD_LOG_JSON") {
            config.json = matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(level) = lookup("CORD_LOG_LEVEL").and_then(|raw| raw.trim().parse().ok()) {
            config.level = level;
        }
        config
    }

    /// Filter directives used when `RUST_LOG` is absent
    pub fn directives(&self) -> String {
        let level = self.level.to_string().to_ascii_lowercase();
        let mut directives = vec![level];
        if self.quiet_dependencies {
            directives.extend(QUIET_DEPENDENCIES.iter().map(|target| format!("{target}=warn")));
        }
        directives.join(",")
    }
}

/// Install a subscriber with [`TracingConfig::default`]
pub fn try_init_tracing() -> Result<(), TracingError> {
    try_init_tracing_with_config(TracingConfig::default())
}

/// Install a subscriber
///
/// `RUST_LOG` takes precedence over the configured directives. Returns
/// [`TracingError::AlreadyInitialized`] instead of panicking when a global
/// subscriber is already installed.
pub fn try_init_tracing_with_config(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directives())
            .map_err(|e| TracingError::InvalidFilter(e.to_string()))?,
    };

    let fmt_layer = fmt::layer()
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    let result = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json().flatten_event(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    };
    result.map_err(|_| TracingError::AlreadyInitialized)
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Tracing subscriber already initialized")]
    AlreadyInitialized,

    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
}
