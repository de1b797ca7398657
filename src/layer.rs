//! Tower integration: apply gates and retries to any `tower_service::Service`.
//!
//! - [`ConcurrencyLayer`] admits requests through a [`ConcurrencyGate`]. A turned-away request
//!   resolves to `Ok(Outcome::Rejected(..))`, exactly like [`ConcurrencyGate::invoke`].
//! - [`RetryLayer`] re-issues a cloned request through a freshly readied clone of the inner
//!   service according to a [`RetryPolicy`].
//!
//! ```rust
//! use ninegates::layer::ConcurrencyLayer;
//! use ninegates::Outcome;
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let layer = ConcurrencyLayer::rejecting(4).unwrap();
//! let svc = layer.layer(service_fn(|n: u32| async move { Ok::<_, std::io::Error>(n + 1) }));
//! assert_eq!(svc.oneshot(1).await.unwrap(), Outcome::Executed(2));
//! # });
//! ```

use crate::concurrency::ConcurrencyGate;
use crate::config::ConcurrencyConfig;
use crate::error::{ConfigError, RetryError};
use crate::outcome::Outcome;
use crate::retry::RetryPolicy;
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Layer bounding in-flight requests of the wrapped service.
#[derive(Debug, Clone)]
pub struct ConcurrencyLayer {
    gate: ConcurrencyGate,
}

impl ConcurrencyLayer {
    pub fn new(config: ConcurrencyConfig) -> Result<Self, ConfigError> {
        Ok(Self { gate: ConcurrencyGate::new(config)? })
    }

    pub fn waiting(max_concurrent: u32) -> Result<Self, ConfigError> {
        Self::new(ConcurrencyConfig::waiting(max_concurrent))
    }

    pub fn rejecting(max_concurrent: u32) -> Result<Self, ConfigError> {
        Self::new(ConcurrencyConfig::rejecting(max_concurrent))
    }

    /// Share an existing gate, so direct `invoke` calls and service calls draw on the same slots.
    pub fn from_gate(gate: ConcurrencyGate) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }
}

impl<S> Layer<S> for ConcurrencyLayer {
    type Service = ConcurrencyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConcurrencyService { inner, gate: self.gate.clone() }
    }
}

/// Service produced by [`ConcurrencyLayer`].
#[derive(Debug, Clone)]
pub struct ConcurrencyService<S> {
    inner: S,
    gate: ConcurrencyGate,
}

impl<S, Request> Service<Request> for ConcurrencyService<S>
where
    Request: Send + 'static,
    S: Service<Request> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Outcome<S::Response>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // Keep the readied instance for this call and leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gate = self.gate.clone();
        Box::pin(async move { gate.invoke(|| inner.call(req)).await })
    }
}

/// Layer retrying failed requests of the wrapped service.
pub struct RetryLayer<E> {
    policy: RetryPolicy<E>,
}

impl<E> RetryLayer<E> {
    pub fn new(policy: RetryPolicy<E>) -> Self {
        Self { policy }
    }
}

impl<E> Clone for RetryLayer<E> {
    fn clone(&self) -> Self {
        Self { policy: self.policy.clone() }
    }
}

impl<E> std::fmt::Debug for RetryLayer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryLayer").field("policy", &self.policy).finish()
    }
}

impl<S, E> Layer<S> for RetryLayer<E> {
    type Service = RetryService<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService { inner, policy: self.policy.clone() }
    }
}

/// Service produced by [`RetryLayer`].
pub struct RetryService<S, E> {
    inner: S,
    policy: RetryPolicy<E>,
}

impl<S: Clone, E> Clone for RetryService<S, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), policy: self.policy.clone() }
    }
}

impl<S, E, Request> Service<Request> for RetryService<S, E>
where
    Request: Clone + Send + 'static,
    S: Service<Request, Error = E> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = RetryError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(RetryError::Inner)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let inner = self.inner.clone();
        let policy = self.policy.clone();
        Box::pin(async move {
            policy
                .execute(move || {
                    let mut svc = inner.clone();
                    let req = req.clone();
                    async move {
                        futures::future::poll_fn(|cx| svc.poll_ready(cx)).await?;
                        svc.call(req).await
                    }
                })
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Rejection;
    use crate::sleeper::InstantSleeper;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[tokio::test]
    async fn concurrency_layer_rejects_when_full() {
        let started = Arc::new(tokio::sync::Barrier::new(2));
        let release = Arc::new(tokio::sync::Barrier::new(2));

        let svc = ServiceBuilder::new().layer(ConcurrencyLayer::rejecting(1).unwrap()).service(
            service_fn({
                let (started, release) = (started.clone(), release.clone());
                move |n: u32| {
                    let (started, release) = (started.clone(), release.clone());
                    async move {
                        if n == 0 {
                            started.wait().await;
                            release.wait().await;
                        }
                        Ok::<_, TestError>(n * 2)
                    }
                }
            }),
        );

        let holder = tokio::spawn(svc.clone().oneshot(0));
        started.wait().await;

        let rejected = svc.clone().oneshot(1).await.unwrap();
        assert_eq!(rejected.rejection(), Some(Rejection::Saturated { in_flight: 1, max: 1 }));

        release.wait().await;
        assert_eq!(holder.await.unwrap().unwrap(), Outcome::Executed(0));
        assert_eq!(svc.oneshot(3).await.unwrap(), Outcome::Executed(6));
    }

    #[tokio::test]
    async fn concurrency_layer_shares_gate_with_direct_calls() {
        let gate = ConcurrencyGate::rejecting(1).unwrap();
        let layer = ConcurrencyLayer::from_gate(gate.clone());
        let svc = layer.layer(service_fn(|_: ()| async { Ok::<_, TestError>("svc") }));

        let direct = gate
            .invoke(|| async move {
                let inside = svc.oneshot(()).await;
                Ok::<_, TestError>(inside)
            })
            .await
            .unwrap();

        let inside = direct.into_option().unwrap().unwrap();
        assert!(inside.is_rejected(), "service call must see the slot held by the direct call");
    }

    #[tokio::test]
    async fn retry_layer_retries_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::builder().max_retries(3).with_sleeper(InstantSleeper).build();

        let svc = ServiceBuilder::new().layer(RetryLayer::new(policy)).service(service_fn({
            let calls = calls.clone();
            move |req: &'static str| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TestError("flaky".into()))
                    } else {
                        Ok(req.len())
                    }
                }
            }
        }));

        assert_eq!(svc.oneshot("hello").await.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_layer_reports_exhaustion() {
        let policy = RetryPolicy::builder().max_retries(2).with_sleeper(InstantSleeper).build();
        let svc = RetryLayer::new(policy)
            .layer(service_fn(|_: u8| async { Err::<u8, _>(TestError("down".into())) }));

        let err = svc.oneshot(1).await.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.last_failure(), Some(&TestError("down".into())));
    }

    #[tokio::test]
    async fn retry_layer_accepts_services_and_requests_that_are_not_sync() {
        use std::cell::Cell;

        let calls = Arc::new(AtomicUsize::new(0));
        let last_seen = Cell::new(0u32);
        let policy = RetryPolicy::builder().max_retries(1).with_sleeper(InstantSleeper).build();

        let svc = RetryLayer::new(policy).layer(service_fn({
            let calls = calls.clone();
            move |req: Cell<u32>| {
                last_seen.set(req.get());
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(TestError("cold start".into()))
                    } else {
                        Ok(req.get() + 1)
                    }
                }
            }
        }));

        assert_eq!(svc.oneshot(Cell::new(41)).await.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
