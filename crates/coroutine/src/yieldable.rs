use core::fmt;
use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{trace, warn};

use coflow_metrics::Metrics;

use crate::deferred::Deferred;
use crate::error::Error;
use crate::instance::Coroutine;
use crate::interop;
use crate::Payload;

/// What a coroutine hands to the runner when it suspends.
#[must_use]
pub enum Yieldable<T, E> {
    /// A value which is already known.
    Immediate(T),

    /// A single-invocation acceptor of a callback, which it must settle exactly once.
    Thunk(Thunk<T, E>),

    /// A value which settles later.
    Deferred(Deferred<T, E>),

    /// Another coroutine, run to completion by the same runner.
    Nested(Coroutine<T, E>),

    /// Settles with whichever contender settles first.
    Race(Vec<Yieldable<T, E>>),

    /// A value of a foreign type, only understood by an adapter registered for it.
    Opaque(Opaque),
}

impl<T, E> Yieldable<T, E>
where
    T: Payload,
    E: Payload,
{
    pub fn thunk<F>(acceptor: F) -> Self
    where
        F: FnOnce(Callback<T, E>) + Send + 'static,
    {
        Self::Thunk(Thunk::new(acceptor))
    }

    pub fn opaque<X>(value: X) -> Self
    where
        X: Any + Send,
    {
        Self::Opaque(Opaque::new(value))
    }

    /// Races `inner` against a timer which fails with [`Error::TimedOut`] once `duration` elapses.
    pub fn timeout(duration: Duration, inner: Self) -> Self {
        Self::Race(vec![inner, Self::Thunk(interop::timer(duration))])
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Yieldable::Immediate(_) => "immediate",
            Yieldable::Thunk(_) => "thunk",
            Yieldable::Deferred(_) => "deferred",
            Yieldable::Nested(_) => "nested",
            Yieldable::Race(_) => "race",
            Yieldable::Opaque(_) => "opaque",
        }
    }
}

impl<T, E> fmt::Debug for Yieldable<T, E>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Yieldable::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            Yieldable::Thunk(_) => f.write_str("Thunk(..)"),
            Yieldable::Deferred(_) => f.write_str("Deferred(..)"),
            Yieldable::Nested(_) => f.write_str("Nested(..)"),
            Yieldable::Race(contenders) => f.debug_tuple("Race").field(contenders).finish(),
            Yieldable::Opaque(opaque) => f.debug_tuple("Opaque").field(opaque).finish(),
        }
    }
}

impl<T, E> From<Deferred<T, E>> for Yieldable<T, E> {
    fn from(deferred: Deferred<T, E>) -> Self {
        Self::Deferred(deferred)
    }
}

impl<T, E> From<Coroutine<T, E>> for Yieldable<T, E> {
    fn from(coroutine: Coroutine<T, E>) -> Self {
        Self::Nested(coroutine)
    }
}

impl<T, E> From<Thunk<T, E>> for Yieldable<T, E> {
    fn from(thunk: Thunk<T, E>) -> Self {
        Self::Thunk(thunk)
    }
}

/// A function which starts an operation and reports its outcome through the given [`Callback`].
pub struct Thunk<T, E> {
    acceptor: Box<dyn FnOnce(Callback<T, E>) + Send>,
}

impl<T, E> Thunk<T, E> {
    pub fn new<F>(acceptor: F) -> Self
    where
        F: FnOnce(Callback<T, E>) + Send + 'static,
    {
        Self {
            acceptor: Box::new(acceptor),
        }
    }

    pub(crate) fn accept(self, callback: Callback<T, E>) {
        (self.acceptor)(callback)
    }
}

/// The settlement side of a [`Thunk`].
///
/// The callback can be cloned and invoked from anywhere, but only the first
/// settlement reaches the coroutine. Later ones are discarded and reported
/// back to the caller as [`Error::DoubleSettlement`].
pub struct Callback<T, E> {
    inner: Arc<CallbackInner<T, E>>,
}

struct CallbackInner<T, E> {
    tx: Mutex<Option<oneshot::Sender<Result<T, Error<E>>>>>,
    metrics: Metrics,
}

impl<T, E> Clone for Callback<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Callback<T, E>
where
    T: Payload,
    E: Payload,
{
    pub(crate) fn channel(metrics: Metrics) -> (Self, oneshot::Receiver<Result<T, Error<E>>>) {
        let (tx, rx) = oneshot::channel();

        let callback = Self {
            inner: Arc::new(CallbackInner {
                tx: Mutex::new(Some(tx)),
                metrics,
            }),
        };

        (callback, rx)
    }

    /// Settles with the outcome of the operation, the error first, following the callback convention.
    pub fn call(&self, error: Option<E>, value: T) -> Result<(), Error<E>> {
        match error {
            Some(error) => self.reject(error),
            None => self.resolve(value),
        }
    }

    pub fn resolve(&self, value: T) -> Result<(), Error<E>> {
        self.settle_with(Ok(value))
    }

    pub fn reject(&self, error: E) -> Result<(), Error<E>> {
        self.settle_with(Err(Error::Failed(error)))
    }

    pub fn settle(&self, result: Result<T, E>) -> Result<(), Error<E>> {
        self.settle_with(result.map_err(Error::Failed))
    }

    /// Settles with any outcome, including the runner's own errors.
    pub fn settle_with(&self, result: Result<T, Error<E>>) -> Result<(), Error<E>> {
        let tx = self
            .inner
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(tx) = tx else {
            warn!(?result, "Discarding duplicate settlement of a thunk callback");

            self.inner.metrics.double_settlements.inc();

            return Err(Error::DoubleSettlement);
        };

        if let Err(result) = tx.send(result) {
            trace!(?result, "Ignoring settlement of a thunk whose run has moved on");

            self.inner.metrics.stale_settlements.inc();
        }

        Ok(())
    }

    /// Whether this callback has already been settled.
    pub fn is_settled(&self) -> bool {
        self.inner
            .tx
            .lock()
            .map(|tx| tx.is_none())
            .unwrap_or(true)
    }
}

/// A type-erased yielded value.
pub struct Opaque {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Opaque {
    pub fn new<X>(value: X) -> Self
    where
        X: Any + Send,
    {
        Self {
            value: Box::new(value),
            type_name: std::any::type_name::<X>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn value_type_id(&self) -> TypeId {
        (*self.value).type_id()
    }

    pub(crate) fn into_value(self) -> Box<dyn Any + Send> {
        self.value
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)
    }
}
