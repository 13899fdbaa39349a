//! Test fixtures and configuration builders

use cord_common::ClientConfig;
use cord_core::Intents;

/// Token every fixture configuration authenticates with
pub const TEST_TOKEN: &str = "test-token";

/// Heartbeat interval long enough that no beat is owed during a test
pub const QUIET_INTERVAL_MS: u64 = 45_000;

/// Client configuration with fast reconnects and no gateway URL
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new(TEST_TOKEN);
    config.intents = Intents::GUILDS | Intents::GUILD_MESSAGES;
    config.gateway.backoff_base_ms = 10;
    config.gateway.backoff_max_ms = 50;
    config.gateway.hello_timeout_ms = 5_000;
    config.rest.requests_per_second = None;
    config
}

/// Fixture configuration connecting straight to `gateway_url`
pub fn config_for_gateway(gateway_url: &str) -> ClientConfig {
    let mut config = test_config();
    config.gateway.url = Some(gateway_url.to_string());
    config
}
