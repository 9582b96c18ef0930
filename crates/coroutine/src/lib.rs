#![doc = include_str!("../README.md")]

use core::fmt;
use std::future::Future;

mod abort;
mod adapter;
mod awaitable;
mod bridge;
mod co;
mod deferred;
mod error;
mod error_channel;
mod instance;
mod runner;
mod yieldable;

pub mod interop;

pub use abort::AbortHandle;
pub use adapter::Adapter;
pub use awaitable::Awaitable;
pub use co::Co;
pub use deferred::{Deferred, Settler};
pub use error::{Error, Operation};
pub use instance::{Coroutine, CoroutineInstance, State, YieldPoint};
pub use runner::{Builder, RunHandle, RunId, Runner};
pub use yieldable::{Callback, Opaque, Thunk, Yieldable};

// Re-export `tracing` so that spans emitted by the runner can be filtered by downstream crates
pub use tracing;

/// Bounds shared by the values and the errors which flow through a coroutine.
pub trait Payload: Clone + Send + fmt::Debug + 'static {}

impl<A> Payload for A where A: Clone + Send + fmt::Debug + 'static {}

/// Outcome of a run: the coroutine's return value,
/// or the first error which escaped its body.
pub type RunResult<T, E> = Result<T, Error<E>>;

/// Runs a coroutine built from `factory` with a default [`Runner`].
///
/// Must be called from within a Tokio runtime.
pub fn run<T, E, F, Fut>(factory: F) -> RunHandle<T, E>
where
    T: Payload,
    E: Payload,
    F: FnOnce(Co<T, E>) -> Fut,
    Fut: Future<Output = RunResult<T, E>> + Send + 'static,
{
    Runner::default().run(Coroutine::new(factory))
}

/// Like [`run`], passing `args` to the factory alongside the [`Co`] handle.
pub fn run_with<T, E, A, F, Fut>(args: A, factory: F) -> RunHandle<T, E>
where
    T: Payload,
    E: Payload,
    F: FnOnce(Co<T, E>, A) -> Fut,
    Fut: Future<Output = RunResult<T, E>> + Send + 'static,
{
    Runner::default().run_with(args, factory)
}
