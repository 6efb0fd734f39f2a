use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::{DistributionError, Phase};
use crate::config::PhaseRetryConfig;

/// Attempt ceiling and sleep schedule for one phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub sleep: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, sleep: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            sleep,
            backoff_multiplier: 1.0,
        }
    }

    pub fn with_backoff(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sleep after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.sleep.mul_f64(self.backoff_multiplier.max(0.0).powi(exponent))
    }
}

impl From<&PhaseRetryConfig> for RetryPolicy {
    fn from(config: &PhaseRetryConfig) -> Self {
        RetryPolicy::new(
            config.max_attempts,
            Duration::from_secs_f64(config.sleep_secs.max(0.0)),
        )
        .with_backoff(config.backoff_multiplier)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts.
pub async fn retry_with_backoff<T, F, Fut>(
    phase: Phase,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, DistributionError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DistributionError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(phase = %phase, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() || attempt >= policy.max_attempts => {
                return Err(DistributionError::Exhausted {
                    phase,
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    phase = %phase,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
