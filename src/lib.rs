#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Nine Gates
//!
//! Execution policies for async Rust: wrap an operation in a gate that decides whether, when,
//! and how often it runs.
//!
//! ## Policies
//!
//! - **[`ConcurrencyGate`]** bounds simultaneous executions, rejecting or waiting when full
//! - **[`ExecutionLatch`]** runs an operation at most once
//! - **[`DebounceGate`]** drops calls arriving inside a quiet period
//! - **[`ReadWriteGate`]** runs readers together and writers alone
//! - **[`PeriodicScheduler`]** fires an operation at a fixed rate until stopped
//! - **[`RetryPolicy`]** retries with a fixed delay, optionally ending in a [`Fallback`]
//! - **[`ResultCache`]** memoizes the last successful result for a TTL
//!
//! Every policy is an explicit value owning its state; clones share that state. A
//! [`GateRegistry`] maps operation keys to shared gate instances when callers need lookup by
//! name. The [`layer`] module applies the concurrency and retry policies to `tower` services.
//!
//! A gate that declines to run an operation says so with [`Outcome::Rejected`]; the
//! operation's own error always comes back untouched on the `Err` side.
//!
//! ## Quick Start
//!
//! ```rust
//! use ninegates::{ConcurrencyGate, Outcome};
//!
//! #[tokio::main]
//! async fn main() {
//!     let gate = ConcurrencyGate::rejecting(2).expect("valid limit");
//!
//!     let outcome = gate
//!         .invoke(|| async {
//!             // Your async operation here
//!             Ok::<_, std::io::Error>(42)
//!         })
//!         .await;
//!
//!     assert_eq!(outcome.unwrap(), Outcome::Executed(42));
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod concurrency;
pub mod config;
pub mod debounce;
pub mod error;
pub mod fallback;
pub mod latch;
pub mod layer;
pub mod outcome;
pub mod periodic;
pub mod prelude;
pub mod registry;
pub mod retry;
pub mod rwgate;
pub mod sleeper;

// Re-exports
pub use cache::{CacheEntry, ResultCache};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use concurrency::ConcurrencyGate;
pub use config::{
    Access, CacheConfig, ConcurrencyConfig, DebounceConfig, PeriodicConfig, RetryConfig,
};
pub use debounce::DebounceGate;
pub use error::{ConfigError, RetryError, SchedulerError, MAX_RETRY_FAILURES};
pub use fallback::{Fallback, FallbackPolicy, FallbackValue};
pub use latch::ExecutionLatch;
pub use outcome::{Outcome, Rejection};
pub use periodic::{BoxError, PeriodicScheduler};
pub use registry::GateRegistry;
pub use retry::{RetryPolicy, RetryPolicyBuilder, RetryWithFallback};
pub use rwgate::ReadWriteGate;
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
