//! Convenient re-exports for common Nine Gates types.
pub use crate::{
    cache::{CacheEntry, ResultCache},
    concurrency::ConcurrencyGate,
    config::{Access, CacheConfig, ConcurrencyConfig, DebounceConfig, PeriodicConfig, RetryConfig},
    debounce::DebounceGate,
    error::{ConfigError, RetryError, SchedulerError},
    fallback::{Fallback, FallbackPolicy, FallbackValue},
    latch::ExecutionLatch,
    layer::{ConcurrencyLayer, RetryLayer},
    outcome::{Outcome, Rejection},
    periodic::PeriodicScheduler,
    registry::GateRegistry,
    retry::{RetryPolicy, RetryWithFallback},
    rwgate::ReadWriteGate,
};
