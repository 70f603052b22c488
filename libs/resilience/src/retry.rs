use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Multiplier applied per retry.
    pub backoff_multiplier: f64,
    /// Add random jitter to each delay (±30%).
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay to wait before retry number `attempt` (1-based).
    ///
    /// Exposed so that loops which must observe a cancellation signal while
    /// backing off can race the sleep themselves instead of calling
    /// [`with_retry`].
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let base = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exp as i32);
        let capped = base.min(self.max_backoff.as_millis() as f64);
        apply_jitter(Duration::from_millis(capped as u64), self.jitter)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("max retries ({0}) exceeded")]
    MaxRetriesExceeded(u32),
    #[error("operation failed: {0}")]
    OperationFailed(E),
}

/// Execute a fallible future with the given retry policy.
pub async fn with_retry<F, Fut, T, E>(config: RetryConfig, mut f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                attempt += 1;

                if attempt > config.max_retries {
                    warn!(max_retries = config.max_retries, %err, "max retries reached");
                    return Err(RetryError::MaxRetriesExceeded(config.max_retries));
                }

                let delay = config.backoff_for(attempt);
                warn!(
                    attempt,
                    max_retries = config.max_retries,
                    ?delay,
                    %err,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let mut rng = rand::thread_rng();
        let factor = 1.0 + rng.gen_range(-0.3..0.3);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    } else {
        base
    }
}
