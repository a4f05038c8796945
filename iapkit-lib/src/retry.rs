//! Bounded retry with backoff for flaky backend calls.
//!
//! [`RetryService::run`] wraps one async operation. Only errors for which
//! [`IapError::is_retryable`] holds are retried: transient backend failures
//! and `NotReady` while the connection can still come back. The caller sees a
//! single outcome, either the first success or the last failure.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::telemetry::{NoopTelemetry, Telemetry};
use crate::Result;

type BackoffFn = dyn Fn(u32) -> Duration + Send + Sync;

/// Attempt budget plus delay schedule.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Arc<BackoffFn>,
}

impl RetryPolicy {
    /// Custom policy. `backoff(n)` is the delay after the `n`-th failed attempt
    /// (1-based). `max_attempts` is clamped to at least one.
    pub fn new<F>(max_attempts: u32, backoff: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(backoff),
        }
    }

    /// Same delay before every retry.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, move |_| delay)
    }

    /// `base * 2^(n-1)`, capped at `max`.
    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self::new(max_attempts, move |attempt| {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            base.saturating_mul(factor).min(max)
        })
    }

    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt.max(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(200), Duration::from_secs(2))
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("first_delay", &self.delay_for_attempt(1))
            .finish()
    }
}

/// Runs operations under a [`RetryPolicy`], reporting retries to telemetry.
#[derive(Clone)]
pub struct RetryService {
    policy: RetryPolicy,
    telemetry: Arc<dyn Telemetry>,
}

impl RetryService {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_telemetry(policy, Arc::new(NoopTelemetry))
    }

    pub fn with_telemetry(policy: RetryPolicy, telemetry: Arc<dyn Telemetry>) -> Self {
        Self { policy, telemetry }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt budget is
    /// spent. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= self.policy.max_attempts {
                #[cfg(feature = "tracing")]
                tracing::warn!(operation, attempts = attempt, error = %err, "retries exhausted");
                self.telemetry.on_retries_exhausted(operation, attempt, &err);
                return Err(err);
            }

            let delay = self.policy.delay_for_attempt(attempt);
            #[cfg(feature = "tracing")]
            tracing::debug!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying backend call"
            );
            self.telemetry
                .on_retry(operation, attempt, delay.as_millis() as u64, &err);

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryService {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl fmt::Debug for RetryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryService")
            .field("policy", &self.policy)
            .finish()
    }
}
