use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Default number of attempts made by [`fetch_with_retry`].
pub const MAX_RETRIES: u32 = 5;
/// Base delay before the first retry.
pub const BASE_DELAY_MS: u64 = 1000;

/// Attempt budget and backoff base for lag-prone read paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call. Zero is treated as one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Upper bound on the time spent sleeping before exhaustion is reported.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts()).fold(Duration::ZERO, |total, attempt| {
            total.saturating_add(retry_delay(self.base_delay, attempt))
        })
    }
}

/// Compute the exponential backoff that follows the failed 1-based `attempt`:
/// `base × 2^(attempt−1)`.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(30);
    base.saturating_mul(2u32.saturating_pow(exponent))
}

/// One failed attempt as reported to retry observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalAttempt {
    pub label: String,
    pub attempt_number: u32,
    pub max_attempts: u32,
    /// Backoff slept before the next attempt; `None` when attempts are exhausted.
    pub backoff: Option<Duration>,
    pub error: String,
}

/// Failure of [`fetch_with_retry`] once every attempt failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub label: String,
    pub attempts: u32,
    pub last_error: E,
}

impl<E> RetryExhausted<E> {
    pub fn into_last_error(self) -> E {
        self.last_error
    }
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: retrieval failed after {} attempts: {}",
            self.label, self.attempts, self.last_error
        )
    }
}

impl<E> std::error::Error for RetryExhausted<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last_error)
    }
}

/// Calls `operation` until it succeeds or the policy's attempts run out,
/// sleeping `base × 2^(attempt−1)` between attempts.
pub async fn fetch_with_retry<T, E, F, Fut>(
    operation: F,
    label: &str,
    policy: RetryPolicy,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    fetch_with_retry_observed(operation, label, policy, |_| {}).await
}

/// [`fetch_with_retry`] that reports every failed attempt to `on_attempt`.
pub async fn fetch_with_retry_observed<T, E, F, Fut, O>(
    mut operation: F,
    label: &str,
    policy: RetryPolicy,
    mut on_attempt: O,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    O: FnMut(&RetrievalAttempt),
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(label, attempt, "retrieval succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let exhausted = attempt >= max_attempts;
        let backoff = (!exhausted).then(|| retry_delay(policy.base_delay, attempt));
        on_attempt(&RetrievalAttempt {
            label: label.to_owned(),
            attempt_number: attempt,
            max_attempts,
            backoff,
            error: error.to_string(),
        });

        let Some(backoff) = backoff else {
            tracing::warn!(label, attempts = attempt, %error, "retrieval exhausted");
            return Err(RetryExhausted {
                label: label.to_owned(),
                attempts: attempt,
                last_error: error,
            });
        };

        tracing::debug!(
            label,
            attempt,
            max_attempts,
            backoff_ms = backoff.as_millis() as u64,
            %error,
            "retrieval attempt failed"
        );
        drop(error);
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}
