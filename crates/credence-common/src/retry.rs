//! Exponential-backoff retry for collaborator calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Retry policy: `attempts` total tries, sleeping `base_delay * 2^n` between
/// them, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// 3 attempts, 0.5 s → 4 s. Used by embedding and search clients.
    pub fn search() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        }
    }

    /// 2 attempts, 0.5 s → 2 s. Used by generation and verification calls.
    pub fn generation() -> Self {
        Self {
            attempts: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        exp.min(self.max_delay)
    }
}

/// Run `op` under `policy`, returning the first success or the last error.
pub async fn with_retries<T, F, Fut>(policy: RetryPolicy, label: &str, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..policy.attempts.max(1) {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt + 1 < policy.attempts {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        "{label} attempt {}/{} failed: {e} — retrying in {delay:?}",
                        attempt + 1,
                        policy.attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
        }
    }
    // attempts >= 1, so last_err is always set by the time we get here
    Err(last_err.unwrap_or_else(|| {
        crate::error::CredenceError::Upstream(format!("{label}: no attempts made"))
    }))
}
