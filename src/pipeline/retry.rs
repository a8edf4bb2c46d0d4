//! Bounded retry with jitter for the fatal state writes, plus the
//! per-call timeout helper every downstream call goes through.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Upper bound of the random jitter added to each retry delay.
const MAX_JITTER_MS: u64 = 100;

/// Exponential backoff policy for state writes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.state_update_attempts.max(1),
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    /// Run once, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => {
                    if self.max_attempts == 1 {
                        return Err(e);
                    }
                    return Err(PipelineError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER_MS));
                    let delay = self.backoff(attempt) + jitter;
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "State write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Await `fut` for at most `limit`; a timeout becomes `PipelineError::Timeout`.
pub async fn bounded<T, E, Fut>(operation: &str, limit: Duration, fut: Fut) -> Result<T, PipelineError>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<PipelineError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(PipelineError::Timeout {
            operation: operation.to_string(),
            timeout: limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::DatabaseError;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = fast_policy(3)
            .run("test_op", || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(PipelineError::Database(DatabaseError::Query("locked".into())))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let err = fast_policy(3)
            .run("test_op", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(PipelineError::Database(DatabaseError::Query("down".into())))
                }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, PipelineError::RetriesExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn single_attempt_returns_original_error() {
        let err = RetryPolicy::none()
            .run("test_op", || async {
                Err::<(), _>(PipelineError::ReferralNotFound { id: uuid::Uuid::nil() })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ReferralNotFound { .. }));
    }

    #[tokio::test]
    async fn bounded_times_out() {
        let err = bounded("slow_call", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, DatabaseError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { .. }));
    }

    #[tokio::test]
    async fn bounded_passes_through_errors() {
        let err = bounded("query", Duration::from_secs(1), async {
            Err::<(), _>(DatabaseError::Query("boom".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Database(_)));
    }
}
