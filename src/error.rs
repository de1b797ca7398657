//! Error types for execution policies

use std::fmt;
use std::sync::Arc;

/// Cap the number of stored failures inside `RetryError::Exhausted` to avoid unbounded growth.
pub const MAX_RETRY_FAILURES: usize = 10;

/// Failure surfaced by the retry family (`RetryPolicy`, `RetryWithFallback`, `FallbackPolicy`).
#[derive(Debug, Clone)]
pub enum RetryError<E> {
    /// The operation failed with an error the retry predicate marked non-retryable.
    Inner(E),
    /// Every attempt failed and no fallback was configured.
    Exhausted { attempts: usize, failures: Arc<Vec<E>> },
    /// Every attempt failed and then the fallback failed too.
    Fallback { attempts: usize, error: E },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner(e) => write!(f, "{}", e),
            Self::Exhausted { attempts, failures } => {
                let recorded = failures.len();
                let truncated_note = if recorded < *attempts {
                    format!(" (recorded last {} failures)", recorded)
                } else {
                    String::new()
                };
                match failures.last() {
                    Some(last) => write!(
                        f,
                        "retry exhausted after {} attempts{}; last error: {}",
                        attempts, truncated_note, last
                    ),
                    None => write!(
                        f,
                        "retry exhausted after {} attempts{}; no recorded failures",
                        attempts, truncated_note
                    ),
                }
            }
            Self::Fallback { attempts, error } => {
                write!(f, "fallback failed after {} attempts: {}", attempts, error)
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Exhausted { failures, .. } => {
                failures.last().map(|e| e as &dyn std::error::Error)
            }
            Self::Fallback { error, .. } => Some(error),
        }
    }
}

impl<E> RetryError<E> {
    /// Build an `Exhausted` variant, keeping only the most recent `MAX_RETRY_FAILURES` failures.
    pub fn exhausted(attempts: usize, failures: Vec<E>) -> Self {
        let trimmed = if failures.len() > MAX_RETRY_FAILURES {
            let skip = failures.len() - MAX_RETRY_FAILURES;
            failures.into_iter().skip(skip).collect()
        } else {
            failures
        };
        RetryError::Exhausted { attempts, failures: Arc::new(trimmed) }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Number of attempts made before giving up (`1` for a non-retryable failure).
    pub fn attempts(&self) -> usize {
        match self {
            Self::Inner(_) => 1,
            Self::Exhausted { attempts, .. } | Self::Fallback { attempts, .. } => *attempts,
        }
    }

    /// Recorded primary-operation failures, oldest first.
    pub fn failures(&self) -> Option<&[E]> {
        match self {
            Self::Exhausted { failures, .. } => Some(failures.as_slice()),
            _ => None,
        }
    }

    /// The failure that ended the call: the operation's last error, or the fallback's error.
    pub fn last_failure(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Exhausted { failures, .. } => failures.last(),
            Self::Fallback { error, .. } => Some(error),
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Invalid policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_concurrent must be >= 1 (got {0})")]
    InvalidMaxConcurrent(u32),
    #[error("periodic interval must be greater than zero")]
    ZeroInterval,
    #[error("cache ttl must be greater than zero")]
    ZeroTtl,
}

/// Failure to drive a periodic scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("background scheduling requires a running tokio runtime")]
    NoRuntime,
    #[error("scheduler runs in the background; pump() is only valid in foreground mode")]
    BackgroundMode,
}
