use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::ApiError;

/// Errors that can tell whether a retry is worthwhile.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for ApiError {
    fn is_transient(&self) -> bool {
        ApiError::is_transient(self)
    }
}

/// Which failures are retried.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RetryCondition {
    /// Every failure, including client errors such as `404`.
    #[default]
    Always,
    /// Only failures whose [`Retryable::is_transient`] is true.
    TransientOnly,
}

/// Bounded exponential backoff around an async operation.
///
/// The delay starts at `initial_delay` and doubles after every failed
/// attempt, capped at `max_delay`. There is no jitter and no cancellation
/// token; dropping the returned future stops further attempts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub condition: RetryCondition,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(30),
            condition: RetryCondition::Always,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Self::default()
        }
    }

    /// Same backoff, but gives up immediately on non-transient failures.
    pub fn transient_only(mut self) -> Self {
        self.condition = RetryCondition::TransientOnly;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Runs `operation` until it succeeds or attempts run out, returning the
    /// last failure unchanged.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.initial_delay.min(self.max_delay);
        let mut attempt = 1;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if attempt >= max_attempts || !self.should_retry(&err) {
                return Err(err);
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying after failure"
            );

            sleep(delay).await;
            delay = delay.saturating_mul(2).min(self.max_delay);
            attempt += 1;
        }
    }

    fn should_retry<E: Retryable>(&self, err: &E) -> bool {
        match self.condition {
            RetryCondition::Always => true,
            RetryCondition::TransientOnly => err.is_transient(),
        }
    }
}

/// Runs `operation` with the default policy: 3 attempts, 1s then 2s apart.
pub async fn retry<T, E, F, Fut>(operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    RetryPolicy::default().run(operation).await
}
