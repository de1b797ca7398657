//! Execution latch: an operation that runs at most once, ever.

use crate::outcome::{Outcome, Rejection};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Runs the wrapped operation for the first caller only. Clones share the fired flag.
///
/// The flag is claimed with a compare-and-swap before the operation starts, so two callers
/// racing on a fresh latch cannot both run it. The winner keeps its result; every other caller
/// gets `Rejection::AlreadyExecuted`. The latch stays fired even if that single run fails or is
/// cancelled.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLatch {
    fired: Arc<AtomicBool>,
}

impl ExecutionLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub async fn invoke<T, E, Fut, Op>(&self, operation: Op) -> Result<Outcome<T>, E>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        if self.fired.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            tracing::debug!("execution latch already fired; call skipped");
            return Ok(Outcome::Rejected(Rejection::AlreadyExecuted));
        }

        tracing::debug!("execution latch fired");
        operation().await.map(Outcome::Executed)
    }
}
