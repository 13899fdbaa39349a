//! When and how long to wait before reopening the gateway socket

use std::time::Duration;

use cord_common::GatewaySettings;
use rand::Rng;

use crate::error::GatewayError;

/// Server-requested pause after op 9
const INVALID_SESSION_PAUSE: (Duration, Duration) =
    (Duration::from_secs(1), Duration::from_secs(5));

/// Reconnect policy for one connection loop
///
/// Consecutive failures widen a full-jitter window that doubles from
/// `backoff_base_ms` up to `backoff_max_ms`. A handshake that reaches
/// `READY` or `RESUMED` clears the failure count.
#[derive(Debug)]
pub(crate) struct ReconnectPolicy {
    base: Duration,
    max: Duration,
    max_attempts: Option<u32>,
    failures: u32,
}

impl ReconnectPolicy {
    pub(crate) fn new(settings: &GatewaySettings) -> Self {
        Self {
            base: Duration::from_millis(settings.backoff_base_ms),
            max: Duration::from_millis(settings.backoff_max_ms),
            max_attempts: settings.max_reconnect_attempts,
            failures: 0,
        }
    }

    /// Delay before the next attempt after a failure or a dropped socket
    ///
    /// Fails with [`GatewayError::ReconnectExhausted`] once the configured
    /// attempt limit is passed.
    pub(crate) fn after_failure(&mut self) -> Result<Duration, GatewayError> {
        let window = self
            .base
            .saturating_mul(2u32.saturating_pow(self.failures))
            .min(self.max);
        self.failures = self.failures.saturating_add(1);

        if let Some(limit) = self.max_attempts {
            if self.failures > limit {
                return Err(GatewayError::ReconnectExhausted(limit));
            }
        }
        if window.is_zero() {
            return Ok(Duration::ZERO);
        }
        Ok(rand::thread_rng().gen_range(Duration::ZERO..=window))
    }

    /// Pause after an invalid session; not counted as a failure
    pub(crate) fn after_invalid_session(&self) -> Duration {
        let (low, high) = INVALID_SESSION_PAUSE;
        rand::thread_rng().gen_range(low..=high)
    }

    /// Session established; the next failure starts from the base delay
    pub(crate) fn connected(&mut self) {
        self.failures = 0;
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }
}
