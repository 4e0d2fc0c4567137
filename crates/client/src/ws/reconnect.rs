//! Caller-level retry policy.
//!
//! The manager never reconnects by itself. Screens that want automatic
//! retries wrap `connect()` with [`connect_with_retry`].

use std::time::Duration;

use chatline_shared::ConnectionError;

use super::connection::SessionContext;
use super::manager::ConnectionManager;

/// Configuration for retrying `connect()` with exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait after the given (zero-based) failed attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis((delay as u32).min(self.max_delay_ms) as u64)
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }
}

/// Call `connect()` until it succeeds or the policy gives up.
///
/// Each failed attempt has already published its own notice. An attempt
/// aborted by `disconnect()` stops the loop: the caller tore the session down.
pub async fn connect_with_retry(
    manager: &ConnectionManager,
    session: &SessionContext,
    policy: &ReconnectPolicy,
) -> Result<(), ConnectionError> {
    let mut attempt = 0u32;
    loop {
        match manager.connect(session).await {
            Ok(()) => return Ok(()),
            Err(ConnectionError::Aborted) => return Err(ConnectionError::Aborted),
            Err(e) => {
                attempt += 1;
                if policy.exhausted(attempt) {
                    crate::log_warn!("Giving up on {} after {} attempts: {}", session.url, attempt, e);
                    return Err(e);
                }
                let delay = policy.delay_for_attempt(attempt - 1);
                crate::log_info!(
                    "Reconnecting to {} in {}ms (attempt {})",
                    session.url,
                    delay.as_millis(),
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
