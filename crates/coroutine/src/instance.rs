use core::fmt;
use std::future::Future;

use futures::FutureExt;
use tracing::trace;

use crate::co::{Co, CoState, Gen, Resume};
use crate::error::{Error, Operation};
use crate::yieldable::Yieldable;
use crate::Payload;

/// Lifecycle of a [`CoroutineInstance`].
///
/// ```text
/// Created -> Running -> Suspended <-> Running -> Completed
///                                        \----> Failed
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Created,
    Running,
    Suspended,
    Completed,
    Failed,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Created => write!(f, "created"),
            State::Running => write!(f, "running"),
            State::Suspended => write!(f, "suspended"),
            State::Completed => write!(f, "completed"),
            State::Failed => write!(f, "failed"),
        }
    }
}

/// What a coroutine reports each time it is stepped.
#[derive(Debug)]
pub enum YieldPoint<T, E> {
    /// The coroutine suspended, waiting on the given yieldable.
    Suspended(Yieldable<T, E>),

    /// The coroutine returned.
    Completed(T),

    /// An error escaped the coroutine body.
    Failed(Error<E>),
}

impl<T, E> YieldPoint<T, E> {
    pub fn is_done(&self) -> bool {
        !matches!(self, YieldPoint::Suspended(_))
    }
}

/// A coroutine body which has not been started yet.
///
/// Built from a factory, then either handed to a [`Runner`](crate::Runner)
/// or yielded by another coroutine as [`Yieldable::Nested`].
pub struct Coroutine<T, E> {
    gen: Gen<T, E>,
}

impl<T, E> Coroutine<T, E>
where
    T: Payload,
    E: Payload,
{
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: FnOnce(Co<T, E>) -> Fut,
        Fut: Future<Output = Result<T, Error<E>>> + Send + 'static,
    {
        Self {
            gen: Gen::new(|co| factory(Co::new(co)).boxed()),
        }
    }

    /// Builds a coroutine from a factory taking arguments alongside the [`Co`] handle.
    pub fn with_args<A, F, Fut>(args: A, factory: F) -> Self
    where
        F: FnOnce(Co<T, E>, A) -> Fut,
        Fut: Future<Output = Result<T, Error<E>>> + Send + 'static,
    {
        Self::new(move |co| factory(co, args))
    }
}

impl<T, E> fmt::Debug for Coroutine<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Coroutine(..)")
    }
}

/// A running coroutine, owned by exactly one run.
///
/// Only ever stepped through [`start`](Self::start), [`resume`](Self::resume)
/// and [`throw_into`](Self::throw_into).
pub struct CoroutineInstance<T, E> {
    gen: Gen<T, E>,
    state: State,
    steps: u64,
}

impl<T, E> CoroutineInstance<T, E>
where
    T: Payload,
    E: Payload,
{
    pub fn new(coroutine: Coroutine<T, E>) -> Self {
        Self {
            gen: coroutine.gen,
            state: State::Created,
            steps: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Number of times this coroutine has been stepped.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Runs the coroutine until its first suspension point or until it terminates.
    pub fn start(&mut self) -> Result<YieldPoint<T, E>, Error<E>> {
        self.expect_state(Operation::Start, State::Created)?;
        Ok(self.step(Resume::Start))
    }

    pub(crate) fn expect_state(&self, operation: Operation, expected: State) -> Result<(), Error<E>> {
        if self.state != expected {
            return Err(Error::InvalidResumeState {
                operation,
                state: self.state,
            });
        }

        Ok(())
    }

    pub(crate) fn step(&mut self, resume: Resume<T, E>) -> YieldPoint<T, E> {
        self.state = State::Running;
        self.steps += 1;

        let point = match self.gen.resume_with(resume) {
            CoState::Yielded(yieldable) => {
                self.state = State::Suspended;
                YieldPoint::Suspended(yieldable)
            }
            CoState::Complete(Ok(value)) => {
                self.state = State::Completed;
                YieldPoint::Completed(value)
            }
            CoState::Complete(Err(error)) => {
                self.state = State::Failed;
                YieldPoint::Failed(error)
            }
        };

        trace!(step = self.steps, state = %self.state, "Stepped coroutine");

        point
    }
}

impl<T, E> fmt::Debug for CoroutineInstance<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoroutineInstance")
            .field("state", &self.state)
            .field("steps", &self.steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_runs_until_first_yield() {
        let mut instance = CoroutineInstance::new(Coroutine::<u32, ()>::new(|co| async move {
            let v = co.value(1).await?;
            Ok(v + 1)
        }));

        assert_eq!(instance.state(), State::Created);

        let point = instance.start().unwrap();
        assert!(matches!(point, YieldPoint::Suspended(Yieldable::Immediate(1))));
        assert_eq!(instance.state(), State::Suspended);
        assert_eq!(instance.steps(), 1);
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut instance =
            CoroutineInstance::new(Coroutine::<u32, ()>::new(|_co| async move { Ok(5) }));

        assert!(matches!(instance.start(), Ok(YieldPoint::Completed(5))));
        assert_eq!(instance.state(), State::Completed);

        assert_eq!(
            instance.start().unwrap_err(),
            Error::InvalidResumeState {
                operation: Operation::Start,
                state: State::Completed,
            }
        );
    }

    #[test]
    fn with_args() {
        let mut instance = CoroutineInstance::new(Coroutine::<u32, ()>::with_args(
            (20, 22),
            |_co, (a, b)| async move { Ok(a + b) },
        ));

        assert!(matches!(instance.start(), Ok(YieldPoint::Completed(42))));
    }

    #[test]
    fn failing_body() {
        let mut instance = CoroutineInstance::new(Coroutine::<u32, &'static str>::new(
            |_co| async move { Err(Error::Failed("x")) },
        ));

        assert!(matches!(
            instance.start(),
            Ok(YieldPoint::Failed(Error::Failed("x")))
        ));
        assert_eq!(instance.state(), State::Failed);
    }
}
