use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::ServiceError;
use crate::config::StatusClientConfig;

/// Retry budget for status calls that hit an unavailable service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceRetry {
    pub attempts: u32,
    pub sleep: Duration,
}

impl ServiceRetry {
    pub fn new(attempts: u32, sleep: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            sleep,
        }
    }

    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn from_config(config: &StatusClientConfig) -> Self {
        Self::new(
            config.retry_attempts,
            Duration::from_secs(config.retry_sleep_secs),
        )
    }
}

/// Run `op`, retrying while it fails with [`ServiceError::Unavailable`].
pub async fn with_service_retry<T, F, Fut>(
    retry: ServiceRetry,
    operation: &str,
    mut op: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < retry.attempts => {
                warn!(
                    operation,
                    attempt,
                    max_attempts = retry.attempts,
                    error = %e,
                    "Status service unavailable, retrying"
                );
                tokio::time::sleep(retry.sleep).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
