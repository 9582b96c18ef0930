use futures::future::BoxFuture;
use genawaiter::sync as gen;
use genawaiter::GeneratorState;

use crate::deferred::Deferred;
use crate::error::Error;
use crate::instance::Coroutine;
use crate::yieldable::{Callback, Thunk, Yieldable};
use crate::Payload;

/// A value with which a suspended coroutine is resumed.
#[derive(Debug)]
pub(crate) enum Resume<T, E> {
    /// Internal signal to start the coroutine, discarded by the generator.
    Start,

    /// The operation the coroutine was waiting on produced a value.
    Value(T),

    /// The operation the coroutine was waiting on failed.
    Error(Error<E>),
}

pub(crate) type Body<T, E> = BoxFuture<'static, Result<T, Error<E>>>;

pub(crate) type Gen<T, E> = gen::Gen<Yieldable<T, E>, Resume<T, E>, Body<T, E>>;

pub(crate) type CoState<T, E> = GeneratorState<Yieldable<T, E>, Result<T, Error<E>>>;

/// Handle given to a coroutine body, through which it suspends.
///
/// Every suspension evaluates to `Ok(value)` when the runner resumes the
/// coroutine with a value, or to `Err(error)` when it throws an error into it.
/// Matching on that result is how a coroutine recovers; propagating it with `?`
/// lets the error escape and terminate the coroutine.
pub struct Co<T, E> {
    inner: gen::Co<Yieldable<T, E>, Resume<T, E>>,
}

impl<T, E> Co<T, E>
where
    T: Payload,
    E: Payload,
{
    pub(crate) fn new(inner: gen::Co<Yieldable<T, E>, Resume<T, E>>) -> Self {
        Self { inner }
    }

    /// Suspends the coroutine until the given yieldable settles.
    pub async fn yield_(&self, yieldable: Yieldable<T, E>) -> Result<T, Error<E>> {
        match self.inner.yield_(yieldable).await {
            Resume::Value(value) => Ok(value),
            Resume::Error(error) => Err(error),
            Resume::Start => Err(Error::UnexpectedResume),
        }
    }

    /// Suspends with a value which is already known.
    pub async fn value(&self, value: T) -> Result<T, Error<E>> {
        self.yield_(Yieldable::Immediate(value)).await
    }

    /// Suspends until the callback handed to `acceptor` is invoked.
    pub async fn thunk<F>(&self, acceptor: F) -> Result<T, Error<E>>
    where
        F: FnOnce(Callback<T, E>) + Send + 'static,
    {
        self.yield_(Yieldable::Thunk(Thunk::new(acceptor))).await
    }

    /// Suspends until the deferred value settles.
    pub async fn deferred(&self, deferred: &Deferred<T, E>) -> Result<T, Error<E>> {
        self.yield_(Yieldable::Deferred(deferred.clone())).await
    }

    /// Runs another coroutine to completion and resumes with its result.
    pub async fn nested(&self, coroutine: Coroutine<T, E>) -> Result<T, Error<E>> {
        self.yield_(Yieldable::Nested(coroutine)).await
    }

    /// Suspends until the first of the given yieldables settles.
    pub async fn race(&self, contenders: Vec<Yieldable<T, E>>) -> Result<T, Error<E>> {
        self.yield_(Yieldable::Race(contenders)).await
    }
}
