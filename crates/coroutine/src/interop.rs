//! Bridges from other styles of asynchronous code into yieldables.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::deferred::Deferred;
use crate::error::Error;
use crate::yieldable::{Callback, Thunk};
use crate::Payload;

/// Turns a callback-style operation into a function producing thunks.
///
/// The operation receives its arguments and the [`Callback`] to settle once it is done,
/// and is only started when the runner adapts the thunk.
///
/// ```rust,ignore
/// let read = thunkify(|path: PathBuf, callback: Callback<String, io::ErrorKind>| {
///     std::thread::spawn(move || {
///         let _ = callback.settle(std::fs::read_to_string(path).map_err(|e| e.kind()));
///     });
/// });
///
/// let contents = co.yield_(read("/etc/hosts".into()).into()).await?;
/// ```
pub fn thunkify<A, T, E, F>(operation: F) -> impl Fn(A) -> Thunk<T, E>
where
    A: Send + 'static,
    T: Payload,
    E: Payload,
    F: Fn(A, Callback<T, E>) + Send + Sync + 'static,
{
    let operation = Arc::new(operation);

    move |args| {
        let operation = Arc::clone(&operation);
        Thunk::new(move |callback| operation(args, callback))
    }
}

/// Drives a future to completion on a new task and exposes its output as a deferred value.
///
/// Must be called from within a Tokio runtime.
pub fn from_future<T, E, F>(future: F) -> Deferred<T, E>
where
    T: Payload,
    E: Payload,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    Deferred::spawn(async move { future.await.map_err(Error::Failed) })
}

/// A thunk which fails with [`Error::TimedOut`] once `duration` has elapsed.
///
/// Its callback is settled even if nothing waits on it anymore,
/// in which case the settlement is ignored.
pub fn timer<T, E>(duration: Duration) -> Thunk<T, E>
where
    T: Payload,
    E: Payload,
{
    Thunk::new(move |callback: Callback<T, E>| {
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = callback.settle_with(Err(Error::TimedOut(duration)));
        });
    })
}
