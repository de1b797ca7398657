//! Outcome of a gated invocation.
//!
//! Gates that may decline to run an operation (concurrency, latch, debounce) report that as a
//! normal value rather than an error. The operation's own failure still travels through the
//! `Err` side of the surrounding `Result`, untouched.

use std::fmt;
use std::time::Duration;

/// Why a gate declined to run the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A concurrency gate was full and configured not to wait.
    Saturated {
        /// Executions in flight when the call was turned away.
        in_flight: usize,
        /// Configured limit.
        max: usize,
    },
    /// An execution latch has already fired.
    AlreadyExecuted,
    /// A debounce gate is still inside its quiet period.
    Debounced {
        /// Time left until the next call would be accepted.
        remaining: Duration,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Saturated { in_flight, max } => {
                write!(f, "concurrency gate saturated ({} in-flight, max {})", in_flight, max)
            }
            Rejection::AlreadyExecuted => write!(f, "operation already executed"),
            Rejection::Debounced { remaining } => {
                write!(f, "debounced ({:?} left in quiet period)", remaining)
            }
        }
    }
}

/// Result of passing an operation through a gate.
#[must_use = "a rejected outcome means the operation did not run"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation ran and produced a value.
    Executed(T),
    /// The gate declined to run the operation.
    Rejected(Rejection),
}

impl<T> Outcome<T> {
    pub fn is_executed(&self) -> bool {
        matches!(self, Outcome::Executed(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected(_))
    }

    /// The rejection reason, if the operation did not run.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Outcome::Rejected(reason) => Some(*reason),
            Outcome::Executed(_) => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Outcome::Executed(value) => Some(value),
            Outcome::Rejected(_) => None,
        }
    }

    /// The produced value, or `default` when the gate declined.
    pub fn unwrap_or(self, default: T) -> T {
        self.into_option().unwrap_or(default)
    }

    /// The produced value, or `T::default()` when the gate declined.
    ///
    /// This is the "empty result" a skipped call hands back to callers that do not care why.
    pub fn unwrap_or_default(self) -> T
    where
        T: Default,
    {
        self.into_option().unwrap_or_default()
    }

    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Executed(value) => Outcome::Executed(f(value)),
            Outcome::Rejected(reason) => Outcome::Rejected(reason),
        }
    }
}
