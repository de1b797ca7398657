//! Fallbacks: the alternate path taken once the primary operation has given up.
//!
//! A fallback is any [`Fallback`] implementation. Plain closures returning a future qualify, and
//! [`FallbackValue`] covers the common "return a fixed default" case. Fallbacks are composed
//! explicitly, either after a retry loop (`RetryPolicy::with_fallback`) or on their own with
//! [`FallbackPolicy`].

use crate::error::RetryError;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

/// Alternate computation producing the caller's result after the primary path failed.
///
/// A fallback runs at most once per call and its own failure is never retried.
pub trait Fallback<T, E>: Send + Sync {
    fn call(&self) -> BoxFuture<'_, Result<T, E>>;
}

impl<T, E, F, Fut> Fallback<T, E> for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    fn call(&self) -> BoxFuture<'_, Result<T, E>> {
        Box::pin(self())
    }
}

/// Fallback that always succeeds with a clone of the stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackValue<T> {
    value: T,
}

impl<T> FallbackValue<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T, E> Fallback<T, E> for FallbackValue<T>
where
    T: Clone + Send + Sync + 'static,
    E: Send + 'static,
{
    fn call(&self) -> BoxFuture<'_, Result<T, E>> {
        let value = self.value.clone();
        Box::pin(async move { Ok(value) })
    }
}

/// Run the operation once and, if it fails, run the fallback once instead.
///
/// This is the retry-free variant of [`RetryWithFallback`](crate::RetryWithFallback).
#[derive(Clone)]
pub struct FallbackPolicy<F> {
    fallback: F,
}

impl<F> fmt::Debug for FallbackPolicy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackPolicy").field("fallback", &"<fallback>").finish()
    }
}

impl<F> FallbackPolicy<F> {
    pub fn new(fallback: F) -> Self {
        Self { fallback }
    }

    /// Returns the operation's value, else the fallback's value.
    ///
    /// A failed fallback surfaces as [`RetryError::Fallback`] with `attempts == 1`.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, RetryError<E>>
    where
        F: Fallback<T, E>,
        E: fmt::Display,
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        tracing::warn!(error = %error, "operation failed; invoking fallback");
        self.fallback.call().await.map_err(|error| {
            tracing::error!(error = %error, "fallback failed");
            RetryError::Fallback { attempts: 1, error }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[tokio::test]
    async fn closure_is_a_fallback() {
        let fallback = || async { Ok::<_, TestError>("cached") };
        assert_eq!(Fallback::call(&fallback).await, Ok("cached"));
    }

    #[tokio::test]
    async fn fallback_value_returns_clones() {
        let fallback = FallbackValue::new(vec![1, 2, 3]);
        let first: Result<Vec<i32>, TestError> = fallback.call().await;
        let second: Result<Vec<i32>, TestError> = fallback.call().await;
        assert_eq!(first.unwrap(), vec![1, 2, 3]);
        assert_eq!(second.unwrap(), vec![1, 2, 3]);
        assert_eq!(fallback.value(), &vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn success_skips_fallback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = FallbackPolicy::new({
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TestError>(0) }
            }
        });

        let result = policy.execute(|| async { Ok::<_, TestError>(5) }).await;
        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_runs_fallback_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = FallbackPolicy::new({
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TestError>(-1) }
            }
        });

        let result = policy.execute(|| async { Err::<i32, _>(TestError("down".into())) }).await;
        assert_eq!(result.unwrap(), -1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_fallback_is_reported() {
        let policy =
            FallbackPolicy::new(|| async { Err::<u8, _>(TestError("backup down".into())) });

        let err = policy
            .execute(|| async { Err::<u8, _>(TestError("primary down".into())) })
            .await
            .unwrap_err();
        assert!(err.is_fallback());
        assert_eq!(err.attempts(), 1);
        assert_eq!(err.last_failure(), Some(&TestError("backup down".into())));
    }
}
