//! Retry with exponential backoff for remote API calls.
//!
//! Both the Hacker News client and the Karakeep client run every request
//! through [`execute`]; they differ only in how their error types classify
//! failures. Backoff doubles per attempt and is capped, and every wait is
//! raced against the caller's cancellation token.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How the executor should react to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Do not retry; return the error as-is (not-found, auth failure, ...).
    Terminal,
    /// Retry with backoff; the remote asked us to slow down (HTTP 429).
    RateLimited,
    /// Retry with backoff (network failure, 5xx, ...).
    Transient,
}

/// Implemented by each API client's error type so [`execute`] can classify
/// failures and synthesize cancellation/exhaustion outcomes.
pub trait Retryable: std::fmt::Display {
    fn classify(&self) -> ErrorClass;

    /// The error returned when the caller's token fires.
    fn cancelled() -> Self;

    /// Wraps the last retryable error once all attempts are spent.
    fn exhausted(attempts: u32, last: Self) -> Self;
}

/// Retry schedule for one logical operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt following `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at `max_delay`.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Runs `operation` up to `policy.max_attempts` times.
///
/// Cancellation is checked before every attempt, raced against the in-flight
/// operation (dropping the future aborts the underlying request), and raced
/// against every backoff wait. Terminal errors return immediately.
pub async fn execute<T, E, Op, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut operation: Op,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        if token.is_cancelled() {
            return Err(E::cancelled());
        }

        let result = tokio::select! {
            () = token.cancelled() => return Err(E::cancelled()),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let class = err.classify();
        if class == ErrorClass::Terminal {
            return Err(err);
        }

        attempt += 1;
        if attempt >= max_attempts {
            return Err(E::exhausted(attempt, err));
        }

        let backoff = policy.backoff(attempt);
        match class {
            ErrorClass::RateLimited => {
                warn!(backoff_ms = backoff.as_millis() as u64, "rate limited, retrying");
            }
            _ => {
                warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    backoff_ms = backoff.as_millis() as u64,
                    "request failed, retrying"
                );
            }
        }

        tokio::select! {
            () = token.cancelled() => return Err(E::cancelled()),
            () = sleep(backoff) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq)]
    enum TestError {
        #[error("terminal")]
        Terminal,
        #[error("transient")]
        Transient,
        #[error("rate limited")]
        RateLimited,
        #[error("cancelled")]
        Cancelled,
        #[error("failed after {attempts} attempts: {source}")]
        Exhausted {
            attempts: u32,
            #[source]
            source: Box<TestError>,
        },
    }

    impl Retryable for TestError {
        fn classify(&self) -> ErrorClass {
            match self {
                TestError::Transient => ErrorClass::Transient,
                TestError::RateLimited => ErrorClass::RateLimited,
                _ => ErrorClass::Terminal,
            }
        }

        fn cancelled() -> Self {
            TestError::Cancelled
        }

        fn exhausted(attempts: u32, last: Self) -> Self {
            TestError::Exhausted {
                attempts,
                source: Box::new(last),
            }
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let token = CancellationToken::new();
        let result: Result<u32, TestError> =
            execute(&fast_policy(), &token, || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = Arc::clone(&calls);

        let result: Result<u32, TestError> = execute(&fast_policy(), &token, || {
            let calls = Arc::clone(&calls_op);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_wraps_last_error() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = Arc::clone(&calls);

        let result: Result<u32, TestError> = execute(&fast_policy(), &token, || {
            let calls = Arc::clone(&calls_op);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::RateLimited)
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            TestError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert_eq!(*source, TestError::RateLimited);
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_error_is_not_retried() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = Arc::clone(&calls);

        let result: Result<u32, TestError> = execute(&fast_policy(), &token, || {
            let calls = Arc::clone(&calls_op);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Terminal)
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), TestError::Terminal);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_token_skips_the_operation() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = Arc::clone(&calls);

        let result: Result<u32, TestError> = execute(&fast_policy(), &token, || {
            let calls = Arc::clone(&calls_op);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), TestError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_during_backoff_aborts_the_wait() {
        let token = CancellationToken::new();
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
        };

        let waiter = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waiter.cancel();
        });

        let start = std::time::Instant::now();
        let result: Result<u32, TestError> =
            execute(&policy, &token, || async { Err(TestError::Transient) }).await;

        assert_eq!(result.unwrap_err(), TestError::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(31), Duration::from_millis(500));
    }
}
