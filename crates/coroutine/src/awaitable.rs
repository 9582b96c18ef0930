use core::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;

use crate::error::Error;
use crate::Payload;

/// The canonical shape of anything a coroutine waits on:
/// settles exactly once, with either a value or an error.
///
/// Every awaitable yields to the scheduler at least once before settling,
/// so a coroutine is never resumed from within the call which suspended it.
#[must_use = "awaitables do nothing unless polled"]
pub struct Awaitable<T, E> {
    future: BoxFuture<'static, Result<T, Error<E>>>,
}

impl<T, E> Awaitable<T, E>
where
    T: Payload,
    E: Payload,
{
    /// Wraps a future which already defers its settlement to the scheduler.
    pub(crate) fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, Error<E>>> + Send + 'static,
    {
        Self {
            future: future.boxed(),
        }
    }

    /// Settles with the given outcome on the next tick.
    pub fn ready(result: Result<T, Error<E>>) -> Self {
        Self::from_future(async move {
            tokio::task::yield_now().await;
            result
        })
    }

    /// Settles with whatever is sent on the channel, or with
    /// [`Error::Abandoned`] if the sender goes away first.
    pub(crate) fn from_receiver(rx: oneshot::Receiver<Result<T, Error<E>>>) -> Self {
        Self::from_future(async move {
            tokio::task::yield_now().await;
            rx.await.unwrap_or(Err(Error::Abandoned))
        })
    }

    /// Fails with [`Error::TimedOut`] if this awaitable does not settle within `duration`.
    pub(crate) fn with_timeout(self, duration: std::time::Duration) -> Self {
        Self::from_future(async move {
            tokio::time::timeout(duration, self)
                .await
                .unwrap_or(Err(Error::TimedOut(duration)))
        })
    }

    /// Settles with [`Error::Cancelled`] if `cancelled` completes first.
    pub(crate) fn or_cancelled<C>(self, cancelled: C) -> Self
    where
        C: Future<Output = ()> + Send + 'static,
    {
        Self::from_future(async move {
            tokio::select! {
                biased;
                () = cancelled => Err(Error::Cancelled),
                result = self => result,
            }
        })
    }
}

impl<T, E> Future for Awaitable<T, E> {
    type Output = Result<T, Error<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl<T, E> fmt::Debug for Awaitable<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Awaitable(..)")
    }
}
