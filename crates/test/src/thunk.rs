use std::time::Duration;

use tokio::sync::oneshot;

use coflow_coroutine::{Callback, Error, Payload, Thunk};

/// A thunk which resolves with `value` once `delay` has elapsed.
pub fn delayed_value<T: Payload, E: Payload>(delay: Duration, value: T) -> Thunk<T, E> {
    Thunk::new(move |callback: Callback<T, E>| {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = callback.resolve(value);
        });
    })
}

/// A thunk which rejects with `error` once `delay` has elapsed.
pub fn delayed_failure<T: Payload, E: Payload>(delay: Duration, error: E) -> Thunk<T, E> {
    Thunk::new(move |callback: Callback<T, E>| {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = callback.reject(error);
        });
    })
}

/// A thunk which rejects with `error` synchronously, from within its acceptor.
pub fn failing<T: Payload, E: Payload>(error: E) -> Thunk<T, E> {
    Thunk::new(move |callback: Callback<T, E>| {
        let _ = callback.reject(error);
    })
}

/// A thunk which never settles, but keeps its callback alive.
pub fn never<T: Payload, E: Payload>() -> Thunk<T, E> {
    Thunk::new(move |callback: Callback<T, E>| {
        tokio::spawn(async move {
            let _callback = callback;
            std::future::pending::<()>().await
        });
    })
}

/// A thunk which settles twice in a row, first with `first` then with `second`.
///
/// The outcome of the second settlement is sent on the returned channel.
pub fn settles_twice<T: Payload, E: Payload>(
    first: T,
    second: T,
) -> (Thunk<T, E>, oneshot::Receiver<Result<(), Error<E>>>) {
    let (tx, rx) = oneshot::channel();

    let thunk = Thunk::new(move |callback: Callback<T, E>| {
        let _ = callback.resolve(first);
        let _ = tx.send(callback.resolve(second));
    });

    (thunk, rx)
}

/// Receives the callback of a thunk built by [`captured`] once the runner has adapted it,
/// so that a test can settle it by hand.
pub struct Captured<T, E> {
    rx: oneshot::Receiver<Callback<T, E>>,
}

impl<T: Payload, E: Payload> Captured<T, E> {
    /// Waits until the thunk has been handed its callback.
    ///
    /// Returns `None` if the thunk was dropped without ever being adapted.
    pub async fn callback(self) -> Option<Callback<T, E>> {
        self.rx.await.ok()
    }
}

/// A thunk whose callback is handed over to the test instead of being settled.
pub fn captured<T: Payload, E: Payload>() -> (Thunk<T, E>, Captured<T, E>) {
    let (tx, rx) = oneshot::channel();

    let thunk = Thunk::new(move |callback: Callback<T, E>| {
        let _ = tx.send(callback);
    });

    (thunk, Captured { rx })
}
