//! Configuration values for each policy kind.
//!
//! Configs are plain, immutable values. They are validated when a policy is constructed from
//! them, so a config deserialized by a binding layer (with the `serde` feature) goes through the
//! same checks as one built in code.

use crate::error::ConfigError;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "serde")]
fn default_true() -> bool {
    true
}

/// Configuration for a [`ConcurrencyGate`](crate::ConcurrencyGate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConcurrencyConfig {
    /// Maximum simultaneous executions; must be at least 1.
    pub max_concurrent: u32,
    /// Suspend until a slot frees instead of rejecting.
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub wait_for_availability: bool,
}

impl ConcurrencyConfig {
    pub fn new(max_concurrent: u32, wait_for_availability: bool) -> Self {
        Self { max_concurrent, wait_for_availability }
    }

    /// Limit to `max_concurrent`, suspending callers while full.
    pub fn waiting(max_concurrent: u32) -> Self {
        Self::new(max_concurrent, true)
    }

    /// Limit to `max_concurrent`, rejecting callers while full.
    pub fn rejecting(max_concurrent: u32) -> Self {
        Self::new(max_concurrent, false)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::InvalidMaxConcurrent(self.max_concurrent));
        }
        Ok(())
    }
}

impl Default for ConcurrencyConfig {
    /// One execution at a time, waiting for the slot.
    fn default() -> Self {
        Self::waiting(1)
    }
}

/// Configuration for a [`DebounceGate`](crate::DebounceGate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DebounceConfig {
    /// Minimum time between two accepted invocations.
    pub quiet_period: Duration,
}

impl DebounceConfig {
    pub fn new(quiet_period: Duration) -> Self {
        Self { quiet_period }
    }
}

/// Access mode declared by each [`ReadWriteGate`](crate::ReadWriteGate) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Access {
    Read,
    Write,
}

impl Access {
    pub fn is_read(self) -> bool {
        matches!(self, Access::Read)
    }
}

impl From<bool> for Access {
    /// `true` selects [`Access::Read`].
    fn from(is_read: bool) -> Self {
        if is_read {
            Access::Read
        } else {
            Access::Write
        }
    }
}

/// Configuration for a [`PeriodicScheduler`](crate::PeriodicScheduler).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeriodicConfig {
    /// Fixed-rate firing interval; must be non-zero.
    pub interval: Duration,
    /// Drive firings from a spawned task. When `false` the caller pumps the schedule.
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub run_in_background: bool,
    /// Let a firing start while the previous one is still running.
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub allow_overlap: bool,
}

impl PeriodicConfig {
    /// Background firing every `interval`, overlap allowed.
    pub fn new(interval: Duration) -> Self {
        Self { interval, run_in_background: true, allow_overlap: true }
    }

    pub fn run_in_background(mut self, background: bool) -> Self {
        self.run_in_background = background;
        self
    }

    pub fn allow_overlap(mut self, allow: bool) -> Self {
        self.allow_overlap = allow;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

/// Configuration for a [`RetryPolicy`](crate::RetryPolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RetryConfig {
    /// Retries after the initial attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Fixed pause between a failed attempt and the next one.
    pub delay: Duration,
}

impl RetryConfig {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total attempts including the initial call.
    pub fn total_attempts(&self) -> usize {
        usize::try_from(self.max_retries).unwrap_or(usize::MAX).saturating_add(1)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, delay: Duration::from_secs(1) }
    }
}

/// Configuration for a [`ResultCache`](crate::ResultCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CacheConfig {
    /// How long a stored result stays valid; must be non-zero.
    pub ttl: Duration,
}

impl CacheConfig {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        Ok(())
    }
}
