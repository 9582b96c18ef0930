use core::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use derive_where::derive_where;
use tracing::warn;

use crate::error::Error;
use crate::Payload;

type Continuation<T, E> = Box<dyn FnOnce(Result<T, Error<E>>) + Send>;

enum Slot<T, E> {
    Pending(Vec<Continuation<T, E>>),
    Settled(Result<T, Error<E>>),
}

/// A value which settles later, exactly once, with either a value or an error.
///
/// Created together with its [`Settler`] by [`Deferred::new`].
/// Continuations registered on a deferred value which has already settled
/// are never invoked inline, they are scheduled on the current runtime instead.
#[derive_where(Clone)]
pub struct Deferred<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

/// The settlement side of a [`Deferred`] value.
#[derive_where(Clone)]
pub struct Settler<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

fn lock<T, E>(slot: &Mutex<Slot<T, E>>) -> MutexGuard<'_, Slot<T, E>> {
    // Continuations never run under the lock, so the slot is consistent even if poisoned
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T, E> Deferred<T, E>
where
    T: Payload,
    E: Payload,
{
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Deferred<T, E>, Settler<T, E>) {
        let slot = Arc::new(Mutex::new(Slot::Pending(Vec::new())));

        let deferred = Deferred {
            slot: Arc::clone(&slot),
        };

        (deferred, Settler { slot })
    }

    pub fn resolved(value: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Settled(Ok(value)))),
        }
    }

    pub fn rejected(error: E) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Settled(Err(Error::Failed(error))))),
        }
    }

    /// Settles with the output of `future`, driven to completion on a new task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, Error<E>>> + Send + 'static,
    {
        let (deferred, settler) = Self::new();

        tokio::spawn(async move {
            let _ = settler.settle_with(future.await);
        });

        deferred
    }

    pub fn is_settled(&self) -> bool {
        matches!(*lock(&self.slot), Slot::Settled(_))
    }

    /// Registers a continuation to be invoked once with the outcome.
    pub fn on_settle<F>(&self, continuation: F)
    where
        F: FnOnce(Result<T, Error<E>>) + Send + 'static,
    {
        let mut slot = lock(&self.slot);

        let result = match &mut *slot {
            Slot::Pending(continuations) => {
                continuations.push(Box::new(continuation));
                return;
            }
            Slot::Settled(result) => result.clone(),
        };

        drop(slot);
        schedule(move || continuation(result));
    }

    /// Registers a success and a failure continuation, only one of which will be invoked.
    pub fn then<S, F>(&self, on_success: S, on_failure: F)
    where
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(Error<E>) + Send + 'static,
    {
        self.on_settle(move |result| match result {
            Ok(value) => on_success(value),
            Err(error) => on_failure(error),
        })
    }
}

impl<T, E> Settler<T, E>
where
    T: Payload,
    E: Payload,
{
    pub fn resolve(&self, value: T) -> Result<(), Error<E>> {
        self.settle_with(Ok(value))
    }

    pub fn reject(&self, error: E) -> Result<(), Error<E>> {
        self.settle_with(Err(Error::Failed(error)))
    }

    pub fn settle(&self, result: Result<T, E>) -> Result<(), Error<E>> {
        self.settle_with(result.map_err(Error::Failed))
    }

    /// Settles the deferred value and runs every registered continuation.
    ///
    /// Returns [`Error::DoubleSettlement`] and leaves the deferred value untouched
    /// if it has already settled.
    pub fn settle_with(&self, result: Result<T, Error<E>>) -> Result<(), Error<E>> {
        let continuations = {
            let mut slot = lock(&self.slot);

            if let Slot::Settled(_) = &*slot {
                warn!(?result, "Discarding duplicate settlement of a deferred value");
                return Err(Error::DoubleSettlement);
            }

            match std::mem::replace(&mut *slot, Slot::Settled(result.clone())) {
                Slot::Pending(continuations) => continuations,
                Slot::Settled(_) => Vec::new(),
            }
        };

        for continuation in continuations {
            continuation(result.clone());
        }

        Ok(())
    }
}

impl<T, E> fmt::Debug for Deferred<T, E>
where
    T: fmt::Debug,
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*lock(&self.slot) {
            Slot::Pending(continuations) => f
                .debug_struct("Deferred")
                .field("pending", &continuations.len())
                .finish(),
            Slot::Settled(result) => f
                .debug_struct("Deferred")
                .field("settled", result)
                .finish(),
        }
    }
}

/// Runs `f` on the next tick of the current runtime, or inline if there is none.
fn schedule<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { f() });
        }
        Err(_) => f(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn settles_once() {
        let (deferred, settler) = Deferred::<u32, String>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        deferred.then(
            move |value| {
                assert_eq!(value, 1);
                counter.fetch_add(1, Ordering::SeqCst);
            },
            |error| panic!("unexpected failure: {error}"),
        );

        assert!(settler.resolve(1).is_ok());
        assert_eq!(settler.resolve(2), Err(Error::DoubleSettlement));
        assert_eq!(settler.reject("late".to_string()), Err(Error::DoubleSettlement));

        assert!(deferred.is_settled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_continuation() {
        let deferred = Deferred::<u32, &'static str>::rejected("nope");
        let seen = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&seen);
        deferred.on_settle(move |result| *sink.lock().unwrap() = Some(result));

        assert_eq!(*seen.lock().unwrap(), Some(Err(Error::Failed("nope"))));
    }

    #[tokio::test]
    async fn settled_continuation_is_not_inline() {
        let deferred = Deferred::<u32, ()>::resolved(7);
        let (tx, rx) = tokio::sync::oneshot::channel();
        let fired = Arc::new(AtomicUsize::new(0));

        let flag = Arc::clone(&fired);
        deferred.on_settle(move |result| {
            flag.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(result);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(rx.await.unwrap(), Ok(7));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
