use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};

/// Fixed-delay retry with a per-attempt deadline.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retries: config.retries,
            delay: config.retry_delay,
            attempt_timeout: config.attempt_timeout,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Calls `op` with the 1-based attempt number until it succeeds, fails
    /// with a non-retryable error, or the budget runs out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts();
        let mut last_error = AppError::Timeout;

        for attempt in 1..=attempts {
            let outcome = match tokio::time::timeout(self.attempt_timeout, op(attempt)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(AppError::Timeout),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        info!(attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "attempt failed");
                    last_error = e;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        Err(AppError::RetriesExhausted {
            attempts,
            last: Box::new(last_error),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn attempt_count_saturates() {
        assert_eq!(policy(0).max_attempts(), 1);
        assert_eq!(policy(u32::MAX).max_attempts(), u32::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_retries_plus_one() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let started = tokio::time::Instant::now();

        let result: Result<()> = policy(2)
            .run(move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::FetchError("down".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(AppError::RetriesExhausted { attempts: 3, .. })
        ));
        // Two sleeps between three attempts.
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_return_immediately() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<()> = policy(2)
            .run(move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::InvalidParam("bad url".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(AppError::InvalidParam(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_a_later_attempt() {
        let result = policy(2)
            .run(|attempt| async move {
                if attempt < 2 {
                    Err(AppError::Timeout)
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out() {
        let mut p = policy(0);
        p.attempt_timeout = Duration::from_secs(1);
        let result: Result<()> = p
            .run(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        match result {
            Err(AppError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 1);
                assert!(matches!(*last, AppError::Timeout));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
