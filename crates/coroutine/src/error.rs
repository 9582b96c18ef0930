use core::fmt;
use std::time::Duration;

use crate::instance::State;

/// The operation which was attempted on a coroutine instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Start,
    Resume,
    Throw,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Start => write!(f, "start"),
            Operation::Resume => write!(f, "resume"),
            Operation::Throw => write!(f, "throw into"),
        }
    }
}

/// The errors a coroutine can observe at a suspension point, and the
/// failures a run can terminate with.
///
/// A run fails with the first error which escapes its coroutine body,
/// delivered unchanged.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error<E> {
    /// An application failure, reported by a thunk or a deferred value,
    /// or raised by a coroutine body itself.
    #[error("Coroutine failed: {0:?}")]
    Failed(E),

    /// The coroutine yielded a value the adapter does not know how to wait on.
    #[error("Unsupported yieldable: {type_name}")]
    UnsupportedYieldable { type_name: &'static str },

    /// A thunk callback or a deferred value was settled more than once.
    /// Only returned to the party which attempted the duplicate settlement.
    #[error("Already settled")]
    DoubleSettlement,

    /// The settlement channel was dropped before delivering a value or an error.
    #[error("Settlement channel was dropped before settling")]
    Abandoned,

    /// The runner attempted to step a coroutine which was not in the expected state.
    #[error("Cannot {operation} a coroutine which is {state}")]
    InvalidResumeState { operation: Operation, state: State },

    /// The coroutine observed the internal start signal after having suspended.
    #[error("Coroutine was resumed with an unexpected value")]
    UnexpectedResume,

    /// The run was aborted by its caller.
    #[error("Coroutine was cancelled")]
    Cancelled,

    /// A timeout elapsed before the awaited operation settled.
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    /// A nested coroutine would exceed the maximum nesting depth.
    #[error("Nested coroutines exceed the maximum depth of {depth}")]
    NestingTooDeep { depth: usize },

    /// A coroutine was stepped more times than allowed.
    #[error("Coroutine exceeded the maximum of {steps} steps")]
    StepLimitExceeded { steps: u64 },

    /// The task driving a spawned run panicked or was torn down.
    #[error("Run crashed: {0}")]
    Crashed(String),
}

impl<E> Error<E> {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Whether this error is a contract violation of the runner itself,
    /// which terminates a run without being injected into the coroutine.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidResumeState { .. }
                | Error::StepLimitExceeded { .. }
                | Error::Crashed(_)
        )
    }

    /// Returns the application failure, if any.
    pub fn failure(&self) -> Option<&E> {
        match self {
            Error::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_failure(self) -> Option<E> {
        match self {
            Error::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Error::Failed(error)
    }
}
