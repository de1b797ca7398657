//! Periodic scheduler: fires an operation at a fixed rate until stopped.
//!
//! In background mode a driver task ticks every `interval`, first one interval after `start()`,
//! and spawns each firing as its own task. Cadence therefore never depends on how long a firing
//! takes. Ticks missed while the runtime was busy are skipped so firings stay on the start
//! epoch's grid.
//!
//! In foreground mode nothing is spawned. The owner calls [`PeriodicScheduler::pump`], which
//! runs at most one firing inline when a boundary has passed. Boundaries missed between pumps
//! are skipped the same way, and the next due time snaps back onto the grid.
//!
//! `stop()` cancels future firings only. A firing already running completes on its own.

use crate::concurrency::ConcurrencyGate;
use crate::config::PeriodicConfig;
use crate::error::{ConfigError, SchedulerError};
use crate::outcome::Outcome;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Type-erased failure of a periodic operation. Only ever logged and counted.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Job = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

enum State {
    Stopped,
    Background { driver: JoinHandle<()> },
    Foreground { next_due: Instant },
}

struct Shared {
    job: Job,
    overlap_guard: Option<ConcurrencyGate>,
    firings: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
}

impl Shared {
    fn run(&self) -> BoxFuture<'static, Result<(), BoxError>> {
        let firing = self.firings.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(firing, "periodic firing started");
        (self.job)()
    }

    async fn fire(&self) {
        let result = match &self.overlap_guard {
            Some(guard) => match guard.invoke(|| self.run()).await {
                Ok(Outcome::Executed(())) => Ok(()),
                Ok(Outcome::Rejected(rejection)) => {
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%rejection, "periodic firing skipped; previous run active");
                    return;
                }
                Err(error) => Err(error),
            },
            None => self.run().await,
        };

        if let Err(error) = result {
            let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(error = %error, failures, "periodic firing failed");
        }
    }
}

/// Runs an operation every `interval` between `start()` and `stop()`.
///
/// Dropping the scheduler stops it.
pub struct PeriodicScheduler {
    shared: Arc<Shared>,
    config: PeriodicConfig,
    state: Mutex<State>,
}

impl fmt::Debug for PeriodicScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicScheduler")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("firings", &self.firings())
            .field("failures", &self.failures())
            .finish()
    }
}

impl PeriodicScheduler {
    /// Create a stopped scheduler. Fails on a zero interval.
    pub fn new<F, Fut, E>(config: PeriodicConfig, operation: F) -> Result<Self, ConfigError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        config.validate()?;

        let job: Job = Arc::new(move || {
            let fut = operation();
            async move { fut.await.map_err(Into::into) }.boxed()
        });
        let overlap_guard =
            if config.allow_overlap { None } else { Some(ConcurrencyGate::rejecting(1)?) };

        Ok(Self {
            shared: Arc::new(Shared {
                job,
                overlap_guard,
                firings: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
            config,
            state: Mutex::new(State::Stopped),
        })
    }

    pub fn config(&self) -> PeriodicConfig {
        self.config
    }

    /// Begin firing. Starting a running scheduler does nothing.
    ///
    /// Background mode needs a tokio runtime on the current thread.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.state();
        if !matches!(*state, State::Stopped) {
            return Ok(());
        }

        let interval = self.config.interval;
        let first = after(Instant::now(), interval);

        *state = if self.config.run_in_background {
            let handle = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
            let shared = Arc::clone(&self.shared);
            let driver = handle.spawn(async move {
                let mut ticker = tokio::time::interval_at(first, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move { shared.fire().await });
                }
            });
            State::Background { driver }
        } else {
            State::Foreground { next_due: first }
        };

        tracing::info!(
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            background = self.config.run_in_background,
            allow_overlap = self.config.allow_overlap,
            "periodic scheduler started"
        );
        Ok(())
    }

    /// Cancel future firings. Stopping a stopped scheduler does nothing.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state(), State::Stopped);
        match previous {
            State::Stopped => {}
            State::Background { driver } => {
                driver.abort();
                tracing::info!(firings = self.firings(), "periodic scheduler stopped");
            }
            State::Foreground { .. } => {
                tracing::info!(firings = self.firings(), "periodic scheduler stopped");
            }
        }
    }

    /// Run one firing inline if a boundary has passed since the last pump. Returns how many ran.
    ///
    /// Boundaries missed while nobody pumped are skipped, not replayed: the next due time moves
    /// to the first boundary after now. Only valid when `run_in_background` is `false`. A stopped
    /// scheduler has nothing due.
    pub async fn pump(&self) -> Result<usize, SchedulerError> {
        if self.config.run_in_background {
            return Err(SchedulerError::BackgroundMode);
        }

        let due = {
            let mut state = self.state();
            match &mut *state {
                State::Foreground { next_due } => {
                    let now = Instant::now();
                    if *next_due > now {
                        false
                    } else {
                        let interval = self.config.interval;
                        let behind = now.duration_since(*next_due).as_nanos() / interval.as_nanos();
                        let steps = u32::try_from(behind).unwrap_or(u32::MAX).saturating_add(1);
                        *next_due = next_due
                            .checked_add(interval.saturating_mul(steps))
                            .filter(|next| *next > now)
                            .unwrap_or_else(|| after(now, interval));
                        if behind > 0 {
                            tracing::debug!(missed = %behind, "skipped missed periodic boundaries");
                        }
                        true
                    }
                }
                _ => false,
            }
        };

        if due {
            self.shared.fire().await;
        }
        Ok(usize::from(due))
    }

    pub fn is_running(&self) -> bool {
        !matches!(*self.state(), State::Stopped)
    }

    /// Firings that actually started.
    pub fn firings(&self) -> u64 {
        self.shared.firings.load(Ordering::Relaxed)
    }

    /// Firings whose operation returned an error.
    pub fn failures(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }

    /// Firings dropped because the previous one was still running (`allow_overlap = false`).
    pub fn skipped(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `from + by`, clamped to roughly thirty years out instead of overflowing.
fn after(from: Instant, by: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);
    from.checked_add(by.min(FAR_FUTURE)).unwrap_or(from)
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let State::Background { driver } = state {
            driver.abort();
        }
    }
}
