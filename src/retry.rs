//! Retry strategy for model calls (§4.8).
//!
//! The core only ever retries one thing: a model call that failed with
//! [`Error::ModelThrottled`]. Every other error kind is unretryable and
//! propagates straight out of the event loop cycle. Delay grows
//! exponentially from `initial_delay`, capped at `max_delay`; there is no
//! jitter in the canonical strategy (a hook can still force an extra retry
//! via `AfterModelCallEvent::retry` regardless of what `should_retry` says —
//! see [`crate::hooks::AfterModelCallEvent`]).

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Exponential backoff policy gating retries of a throttled model call.
///
/// Defaults match the source SDK's: 6 attempts, starting at 4s, doubling up
/// to a 128s ceiling — tuned for provider rate limits that clear on the
/// order of minutes, not network blips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryStrategy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_secs_f64(4.0),
            max_delay: Duration::from_secs_f64(128.0),
        }
    }
}

impl RetryStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// True iff `error` is retryable at all, and the next attempt (0-indexed
    /// `attempt_index + 1`) would still fit under `max_attempts`.
    pub fn should_retry(&self, error: &Error, attempt_index: u32) -> bool {
        error.is_model_throttled() && attempt_index + 1 < self.max_attempts
    }

    /// Delay before the retry following `attempt_index` (0-indexed): doubles
    /// each attempt, capped at `max_delay`.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64();
        let scaled = base * 2f64.powi(attempt_index as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// General-purpose jittered backoff for callers retrying their own
/// operations (e.g. a custom [`crate::model::Model`] adapter retrying its
/// own HTTP transport). Independent from, and not used by, the event loop's
/// internal retry decision above — that one only ever retries
/// [`Error::ModelThrottled`] via [`RetryStrategy`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,

    /// Initial delay before first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (e.g., 2.0 doubles the delay each time)
    pub backoff_multiplier: f64,

    /// Add random jitter to prevent thundering herd (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set jitter factor (0.0 to 1.0)
    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Calculate delay for a given attempt with exponential backoff and jitter
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponential_delay = base_delay_ms * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay = exponential_delay.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped_delay * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let final_delay = capped_delay + jitter - (jitter_range / 2.0);

        Duration::from_millis(final_delay.max(0.0) as u64)
    }
}

/// Retry an async operation with exponential backoff and jitter, regardless
/// of error kind.
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                last_error = Some(err);
                if attempt < config.max_attempts - 1 {
                    let delay = config.calculate_delay(attempt);
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::other("Retry failed with no error")))
}

/// Whether `error` looks transient: network failures, timeouts, and 5xx
/// responses. Config and input errors are never retryable.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Http(_) => true,
        Error::Timeout => true,
        Error::Stream(_) => true,
        Error::Api(msg) => {
            msg.contains("500") || msg.contains("502") || msg.contains("503") || msg.contains("504")
        }
        Error::Config(_) => false,
        Error::InvalidInput(_) => false,
        _ => false,
    }
}

/// Like [`retry_with_backoff`], but bails out immediately on an error
/// [`is_retryable_error`] says isn't transient.
pub async fn retry_with_backoff_conditional<F, Fut, T>(
    config: RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !is_retryable_error(&err) {
                    return Err(err);
                }
                last_error = Some(err);
                if attempt < config.max_attempts - 1 {
                    let delay = config.calculate_delay(attempt);
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::other("Retry failed with no error")))
}
