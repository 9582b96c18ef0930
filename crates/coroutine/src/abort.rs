use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Shared by every coroutine of one run tree.
///
/// Each call to [`AbortHandle::abort`] is a request which is delivered once,
/// as [`Error::Cancelled`](crate::Error::Cancelled), to whichever coroutine of
/// the tree is suspended when the request is observed. A coroutine which
/// recovers from the cancellation keeps running until the next request.
#[derive(Clone, Debug)]
pub(crate) struct AbortSignal {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    requested: watch::Sender<u64>,
    delivered: AtomicU64,
}

impl AbortSignal {
    pub fn new() -> Self {
        let (requested, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                requested,
                delivered: AtomicU64::new(0),
            }),
        }
    }

    pub fn handle(&self) -> AbortHandle {
        AbortHandle {
            signal: self.clone(),
        }
    }

    /// Completes once an undelivered abort request is observed, marking that one request delivered.
    pub async fn requested(self) {
        let mut rx = self.inner.requested.subscribe();

        loop {
            let requested = *rx.borrow_and_update();
            let delivered = self.inner.delivered.load(Ordering::Acquire);

            if requested > delivered
                && self
                    .inner
                    .delivered
                    .compare_exchange(delivered, delivered + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                return;
            }

            if requested > delivered {
                // Another waiter raced us to it
                continue;
            }

            if rx.changed().await.is_err() {
                // The sender lives as long as `self`
                return std::future::pending().await;
            }
        }
    }
}

/// Caller-side handle to abort a run.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    signal: AbortSignal,
}

impl AbortHandle {
    /// Requests that the suspended coroutine be resumed with [`Error::Cancelled`](crate::Error::Cancelled).
    ///
    /// A request made before the coroutine first suspends is held, and delivered
    /// at its first suspension, whatever it yields there.
    ///
    /// Has no effect once the run has terminated.
    pub fn abort(&self) {
        self.signal.inner.requested.send_modify(|n| *n += 1);
    }

    /// Number of abort requests made so far.
    pub fn requests(&self) -> u64 {
        *self.signal.inner.requested.borrow()
    }
}
