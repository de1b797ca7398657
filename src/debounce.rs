//! Debounce gate: drops invocations that arrive inside a quiet period.
//!
//! Only *accepted* calls move the window. A suppressed call leaves no trace, so a steady stream
//! of calls spaced closer than the quiet period still gets one execution per period rather than
//! starving forever.

use crate::clock::{duration_nanos, Clock, MonotonicClock};
use crate::config::DebounceConfig;
use crate::outcome::{Outcome, Rejection};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Marker for "no call accepted yet". Readings are stored as clock nanoseconds.
const NEVER: u64 = u64::MAX;

/// Suppresses calls closer than `quiet_period` to the last accepted call. Clones share state.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    last_accepted: Arc<AtomicU64>,
    config: DebounceConfig,
    clock: Arc<dyn Clock>,
}

impl DebounceGate {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            last_accepted: Arc::new(AtomicU64::new(NEVER)),
            config,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Shorthand for `DebounceGate::new(DebounceConfig::new(quiet_period))`.
    pub fn with_quiet_period(quiet_period: Duration) -> Self {
        Self::new(DebounceConfig::new(quiet_period))
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> DebounceConfig {
        self.config
    }

    /// Run `operation` unless the gate is inside its quiet period.
    pub async fn invoke<T, E, Fut, Op>(&self, operation: Op) -> Result<Outcome<T>, E>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        if let Err(rejection) = self.try_accept() {
            tracing::debug!(%rejection, "call debounced");
            return Ok(Outcome::Rejected(rejection));
        }
        operation().await.map(Outcome::Executed)
    }

    /// Claim the current window. The timestamp is published before the operation starts, so a
    /// slow operation cannot be re-entered by a caller arriving during its own run.
    fn try_accept(&self) -> Result<(), Rejection> {
        let quiet = self.config.quiet_period;
        let now = duration_nanos(self.clock.now());
        let mut last = self.last_accepted.load(Ordering::Acquire);

        loop {
            if last != NEVER {
                let elapsed = Duration::from_nanos(now.saturating_sub(last));
                if elapsed < quiet {
                    return Err(Rejection::Debounced { remaining: quiet - elapsed });
                }
            }

            match self.last_accepted.compare_exchange_weak(
                last,
                now,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => last = actual,
            }
        }
    }
}
