//! Shared exponential-backoff policy.
//!
//! Every retrying call site — response waits, navigation, quick-edit
//! submissions — derives its schedule from the same [`RetryPolicy`] rather
//! than hand-rolling delays.

use tokio::time::Duration;
use tracing::debug;

use crate::infrastructure::config::RetryConfig;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier.max(1.0),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based). Attempt 1 waits the
    /// base delay; each further attempt multiplies it, capped at the max.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let scaled = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent as i32);
        let capped = scaled.min(self.max_delay.as_millis() as f64);
        let millis = if self.jitter {
            // +/-25% keeps concurrent retries from synchronizing
            let spread = capped * 0.25;
            let offset = fastrand::f64() * 2.0 * spread - spread;
            (capped + offset).max(0.0)
        } else {
            capped
        };
        Duration::from_millis(millis as u64)
    }

    /// Sleeps out the backoff for retry number `attempt`.
    pub async fn backoff(&self, attempt: u32) {
        let delay = self.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");
        tokio::time::sleep(delay).await;
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config)
    }
}
