//! Concurrency gate: bounds simultaneous executions of one operation.
//!
//! Admission is a single semaphore acquisition, so the "is there room" check and the in-flight
//! increment cannot be split by another caller. The permit is an RAII guard: it is returned on
//! success, on error, when the operation panics, and when the caller drops the future mid-flight.
//!
//! A full gate either rejects (`wait_for_availability = false`) or parks the caller until a
//! permit is released. Parked callers are woken by the release itself, not by polling. Tokio's
//! semaphore happens to serve waiters in FIFO order; callers should not depend on that.

use crate::config::ConcurrencyConfig;
use crate::error::ConfigError;
use crate::outcome::{Outcome, Rejection};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Bounds the number of in-flight executions. Clones share the same slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    config: ConcurrencyConfig,
}

impl ConcurrencyGate {
    /// Build a gate, rejecting `max_concurrent == 0`.
    pub fn new(config: ConcurrencyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let permits = usize::try_from(config.max_concurrent)
            .unwrap_or(Semaphore::MAX_PERMITS)
            .min(Semaphore::MAX_PERMITS);
        Ok(Self { semaphore: Arc::new(Semaphore::new(permits)), config })
    }

    /// Gate that suspends callers while full.
    pub fn waiting(max_concurrent: u32) -> Result<Self, ConfigError> {
        Self::new(ConcurrencyConfig::waiting(max_concurrent))
    }

    /// Gate that rejects callers while full.
    pub fn rejecting(max_concurrent: u32) -> Result<Self, ConfigError> {
        Self::new(ConcurrencyConfig::rejecting(max_concurrent))
    }

    pub fn config(&self) -> ConcurrencyConfig {
        self.config
    }

    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent as usize
    }

    /// Executions currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent().saturating_sub(self.semaphore.available_permits())
    }

    /// Run `operation` if a slot is available (or becomes available, when waiting).
    ///
    /// Operation errors pass through untouched after the slot is released.
    pub async fn invoke<T, E, Fut, Op>(&self, operation: Op) -> Result<Outcome<T>, E>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        let permit = match self.admit().await {
            Ok(permit) => permit,
            Err(rejection) => return Ok(Outcome::Rejected(rejection)),
        };

        let result = operation().await;
        drop(permit);
        result.map(Outcome::Executed)
    }

    /// Take a slot, or report why none was granted.
    pub(crate) async fn admit(&self) -> Result<OwnedSemaphorePermit, Rejection> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => {
                tracing::trace!(
                    in_flight = self.in_flight(),
                    max = self.max_concurrent(),
                    "slot acquired"
                );
                return Ok(permit);
            }
            Err(TryAcquireError::NoPermits) if self.config.wait_for_availability => {}
            // The semaphore is never closed; a closed one is reported as saturation.
            Err(TryAcquireError::Closed) => return Err(self.saturated()),
            Err(TryAcquireError::NoPermits) => {
                let rejection = self.saturated();
                tracing::debug!(
                    in_flight = self.in_flight(),
                    max = self.max_concurrent(),
                    "concurrency gate full; call rejected"
                );
                return Err(rejection);
            }
        }

        tracing::debug!(max = self.max_concurrent(), "concurrency gate full; waiting for a slot");
        // The semaphore is never closed, so this only fails if that invariant breaks.
        Arc::clone(&self.semaphore).acquire_owned().await.map_err(|_| self.saturated())
    }

    fn saturated(&self) -> Rejection {
        Rejection::Saturated { in_flight: self.in_flight(), max: self.max_concurrent() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn rejects_zero_capacity() {
        let err = ConcurrencyGate::rejecting(0).unwrap_err();
        assert_eq!(err, ConfigError::InvalidMaxConcurrent(0));
    }

    #[tokio::test]
    async fn sequential_calls_within_limit_all_run() {
        let gate = ConcurrencyGate::rejecting(3).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = counter.clone();
            let outcome = gate
                .invoke(|| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TestError>(42)
                })
                .await
                .unwrap();
            assert_eq!(outcome, Outcome::Executed(42));
        }

        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn rejects_when_full_and_not_waiting() {
        let gate = ConcurrencyGate::rejecting(2).unwrap();
        let started = Arc::new(tokio::sync::Barrier::new(3)); // 2 holders + test
        let release = Arc::new(tokio::sync::Barrier::new(3));

        let mut handles = vec![];
        for _ in 0..2 {
            let gate = gate.clone();
            let started = started.clone();
            let release = release.clone();
            handles.push(tokio::spawn(async move {
                gate.invoke(|| async move {
                    started.wait().await;
                    release.wait().await;
                    Ok::<_, TestError>(())
                })
                .await
            }));
        }

        started.wait().await;
        assert_eq!(gate.in_flight(), 2);

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        let outcome = gate
            .invoke(|| async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(())
            })
            .await
            .unwrap();

        assert_eq!(outcome.rejection(), Some(Rejection::Saturated { in_flight: 2, max: 2 }));
        assert_eq!(ran.load(Ordering::SeqCst), 0, "rejected call must not run");

        release.wait().await;
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_executed());
        }
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn waiting_caller_runs_after_slot_frees() {
        let gate = ConcurrencyGate::waiting(1).unwrap();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = tokio::spawn({
            let gate = gate.clone();
            async move {
                gate.invoke(|| async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok::<_, TestError>("holder")
                })
                .await
            }
        });
        started_rx.await.unwrap();

        let waiter = tokio::spawn({
            let gate = gate.clone();
            async move { gate.invoke(|| async { Ok::<_, TestError>("waiter") }).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "waiter must park while the slot is held");

        let _ = release_tx.send(());
        assert_eq!(holder.await.unwrap().unwrap(), Outcome::Executed("holder"));
        assert_eq!(waiter.await.unwrap().unwrap(), Outcome::Executed("waiter"));
    }

    #[tokio::test]
    async fn waiting_gate_never_exceeds_limit() {
        let gate = ConcurrencyGate::waiting(3).unwrap();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for i in 0..12 {
            let gate = gate.clone();
            let current = current.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                gate.invoke(|| async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, TestError>(i)
                })
                .await
            }));
        }

        let results = futures::future::join_all(handles).await;
        let executed = results
            .iter()
            .filter(|r| r.as_ref().unwrap().as_ref().unwrap().is_executed())
            .count();

        assert_eq!(executed, 12, "waiting gate should eventually admit everyone");
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {} exceeded limit", peak);
    }

    #[tokio::test]
    async fn failure_releases_slot_and_propagates() {
        let gate = ConcurrencyGate::rejecting(1).unwrap();

        let result = gate
            .invoke(|| async { Err::<(), _>(TestError("operation failed".to_string())) })
            .await;

        assert_eq!(result.unwrap_err(), TestError("operation failed".to_string()));
        assert_eq!(gate.in_flight(), 0);
        assert!(gate.invoke(|| async { Ok::<_, TestError>(()) }).await.unwrap().is_executed());
    }

    #[tokio::test]
    async fn panic_releases_slot() {
        let gate = ConcurrencyGate::rejecting(1).unwrap();

        let result: Result<Result<Outcome<()>, TestError>, _> =
            std::panic::AssertUnwindSafe(gate.invoke(|| async { panic!("boom") }))
                .catch_unwind()
                .await;

        assert!(result.is_err());
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancelled_call_releases_slot() {
        let gate = ConcurrencyGate::rejecting(1).unwrap();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            gate.invoke(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, TestError>(())
            }),
        )
        .await;

        assert!(cancelled.is_err(), "call should have been cancelled by the timeout");
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn repeated_rejections_leave_the_gate_open() {
        let gate = ConcurrencyGate::rejecting(1).unwrap();
        let held = gate.admit().await.unwrap();

        for _ in 0..10 {
            let rejection = gate.admit().await.unwrap_err();
            assert_eq!(rejection, Rejection::Saturated { in_flight: 1, max: 1 });
        }
        assert!(!gate.semaphore.is_closed());

        drop(held);
        let outcome = gate.invoke(|| async { Ok::<_, TestError>(7) }).await.unwrap();
        assert_eq!(outcome.into_option(), Some(7));
    }
}
