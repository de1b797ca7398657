//! Retry policy for fallible async operations.
//!
//! Semantics:
//! - `max_retries` counts retries *after* the initial attempt, so a call makes at most
//!   `max_retries + 1` attempts.
//! - Every `Err` is a failed attempt. The `should_retry` predicate can mark an error fatal, in
//!   which case it is returned at once as `RetryError::Inner`.
//! - Between a failed attempt and the next one the policy waits a fixed `delay` through its
//!   [`Sleeper`]. Production uses `TokioSleeper`; tests inject `InstantSleeper` or
//!   `TrackingSleeper`.
//! - Attempt counting is per call. Concurrent calls through one policy do not share a budget.
//!
//! [`RetryPolicy::with_fallback`] adds a fallback that runs exactly once when every attempt has
//! failed. The fallback's own failure is surfaced as `RetryError::Fallback` and never retried.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use ninegates::{RetryError, RetryPolicy};
//!
//! #[derive(Debug)]
//! struct MyErr;
//! impl std::fmt::Display for MyErr { fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "oops") } }
//! impl std::error::Error for MyErr {}
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::<MyErr>::builder()
//!     .max_retries(2)
//!     .delay(Duration::from_millis(1))
//!     .build();
//! let result: Result<(), RetryError<MyErr>> = policy.execute(|| async { Err(MyErr) }).await;
//! assert_eq!(result.unwrap_err().attempts(), 3);
//!
//! let guarded = policy.with_fallback(|| async { Ok::<_, MyErr>(false) });
//! let value = guarded.execute(|| async { Err::<bool, _>(MyErr) }).await.unwrap();
//! assert!(!value);
//! # });
//! ```

use crate::config::RetryConfig;
use crate::error::{RetryError, MAX_RETRY_FAILURES};
use crate::fallback::Fallback;
use crate::sleeper::{Sleeper, TokioSleeper};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Retry policy combining attempt budget, fixed delay, predicate, and sleeper.
pub struct RetryPolicy<E> {
    config: RetryConfig,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            should_retry: Arc::clone(&self.should_retry),
            sleeper: Arc::clone(&self.sleeper),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.config.max_retries)
            .field("delay", &self.config.delay)
            .field("sleeper", &self.sleeper)
            .field("should_retry", &"<predicate>")
            .finish()
    }
}

impl<E> RetryPolicy<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Policy retrying every error with the given config on the tokio timer.
    pub fn new(config: RetryConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Construct a new builder with defaults (3 retries, 1 second apart).
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    pub fn config(&self) -> RetryConfig {
        self.config
    }

    /// Execute an async operation with retry semantics.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, RetryError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnMut() -> Fut,
    {
        let max_attempts = self.config.total_attempts();
        let mut failures: VecDeque<E> = VecDeque::new();

        for attempt in 1..=max_attempts {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !(self.should_retry)(&error) {
                tracing::debug!(attempt, error = %error, "error is not retryable");
                return Err(RetryError::Inner(error));
            }

            tracing::warn!(attempt, max_attempts, error = %error, "attempt failed");
            failures.push_back(error);
            while failures.len() > MAX_RETRY_FAILURES {
                failures.pop_front();
            }

            if attempt < max_attempts {
                self.sleeper.sleep(self.config.delay).await;
            }
        }

        tracing::warn!(attempts = max_attempts, "retries exhausted");
        Err(RetryError::exhausted(max_attempts, failures.into_iter().collect()))
    }

    /// Run `fallback` once whenever every attempt has failed.
    pub fn with_fallback<F>(self, fallback: F) -> RetryWithFallback<E, F> {
        RetryWithFallback { retry: self, fallback }
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder<E> {
    config: RetryConfig,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            config: RetryConfig::default(),
            should_retry: Arc::new(|_| true),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace retry count and delay at once.
    pub fn config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Retries after the initial attempt. Zero means a single attempt.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Fixed pause between attempts.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    /// Predicate to decide if an error is retryable.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Every `RetryConfig` is valid, so building cannot fail.
    pub fn build(self) -> RetryPolicy<E> {
        RetryPolicy { config: self.config, should_retry: self.should_retry, sleeper: self.sleeper }
    }
}

impl<E> Default for RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Retry policy whose exhaustion hands over to a fallback.
pub struct RetryWithFallback<E, F> {
    retry: RetryPolicy<E>,
    fallback: F,
}

impl<E, F: Clone> Clone for RetryWithFallback<E, F> {
    fn clone(&self) -> Self {
        Self { retry: self.retry.clone(), fallback: self.fallback.clone() }
    }
}

impl<E, F> fmt::Debug for RetryWithFallback<E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryWithFallback")
            .field("retry", &self.retry)
            .field("fallback", &"<fallback>")
            .finish()
    }
}

impl<E, F> RetryWithFallback<E, F>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn retry(&self) -> &RetryPolicy<E> {
        &self.retry
    }

    /// Retry `operation`; after the last failed attempt return the fallback's result instead.
    ///
    /// Non-retryable errors skip the fallback and come back as `RetryError::Inner`.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, RetryError<E>>
    where
        F: Fallback<T, E>,
        Fut: Future<Output = Result<T, E>>,
        Op: FnMut() -> Fut,
    {
        match self.retry.execute(operation).await {
            Err(RetryError::Exhausted { attempts, .. }) => {
                tracing::info!(attempts, "retries exhausted; invoking fallback");
                self.fallback.call().await.map_err(|error| {
                    tracing::error!(attempts, error = %error, "fallback failed");
                    RetryError::Fallback { attempts, error }
                })
            }
            other => other,
        }
    }
}
