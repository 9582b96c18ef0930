use std::time::Duration;

use coflow_coroutine::{Deferred, Error, Payload, Settler};

/// A deferred value which settles with `result` once `delay` has elapsed.
pub fn delayed<T: Payload, E: Payload>(delay: Duration, result: Result<T, E>) -> Deferred<T, E> {
    Deferred::spawn(async move {
        tokio::time::sleep(delay).await;
        result.map_err(Error::Failed)
    })
}

/// A deferred value left pending, along with the settler to settle it by hand.
pub fn pending<T: Payload, E: Payload>() -> (Deferred<T, E>, Settler<T, E>) {
    Deferred::new()
}
