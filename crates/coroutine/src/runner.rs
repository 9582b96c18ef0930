use core::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use async_recursion::async_recursion;
use derive_where::derive_where;
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, error, trace, Instrument};

use coflow_config::RunnerConfig;
use coflow_metrics::{Metrics, Outcome};

use crate::abort::{AbortHandle, AbortSignal};
use crate::adapter::Adapter;
use crate::co::Co;
use crate::deferred::Deferred;
use crate::error::Error;
use crate::instance::{Coroutine, CoroutineInstance, YieldPoint};
use crate::yieldable::Yieldable;
use crate::Payload;

/// Identifies one run, nested runs included.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u64);

impl RunId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Drives coroutines to completion.
///
/// Starts a coroutine, adapts every value it yields into an [`Awaitable`](crate::Awaitable),
/// waits for it to settle, and feeds the outcome back into the coroutine,
/// until the coroutine returns or an error escapes it.
///
/// Cheap to clone, every clone shares the same adapter, configuration and metrics.
#[derive_where(Clone)]
pub struct Runner<T, E> {
    inner: Arc<Inner<T, E>>,
}

struct Inner<T, E> {
    adapter: Adapter<T, E>,
    config: RunnerConfig,
    metrics: Metrics,
    next_id: AtomicU64,
}

impl<T, E> Runner<T, E>
where
    T: Payload,
    E: Payload,
{
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> Builder<T, E> {
        Builder::default()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub(crate) fn adapter(&self) -> &Adapter<T, E> {
        &self.inner.adapter
    }

    fn next_id(&self) -> RunId {
        RunId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Drives the coroutine to completion on the current task.
    pub async fn drive(&self, coroutine: Coroutine<T, E>) -> Result<T, Error<E>> {
        let scope = Scope::root(self.clone(), AbortSignal::new());
        drive(coroutine, scope).await
    }

    /// Drives the coroutine to completion on a new task.
    ///
    /// The returned handle is itself a future resolving to the outcome of the run,
    /// and can be used to abort it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(&self, coroutine: Coroutine<T, E>) -> RunHandle<T, E> {
        let signal = AbortSignal::new();
        let abort = signal.handle();
        let scope = Scope::root(self.clone(), signal);
        let id = scope.id;

        let task = tokio::spawn(drive(coroutine, scope));

        RunHandle { id, task, abort }
    }

    /// Builds a coroutine from `factory` and `args`, then runs it like [`Runner::run`].
    pub fn run_with<A, F, Fut>(&self, args: A, factory: F) -> RunHandle<T, E>
    where
        F: FnOnce(Co<T, E>, A) -> Fut,
        Fut: Future<Output = Result<T, Error<E>>> + Send + 'static,
    {
        self.run(Coroutine::with_args(args, factory))
    }
}

impl<T, E> Default for Runner<T, E>
where
    T: Payload,
    E: Payload,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Runner<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("adapter", &self.inner.adapter)
            .field("config", &self.inner.config)
            .finish()
    }
}

pub struct Builder<T, E> {
    adapter: Adapter<T, E>,
    config: RunnerConfig,
    metrics: Option<Metrics>,
}

impl<T, E> Default for Builder<T, E>
where
    T: Payload,
    E: Payload,
{
    fn default() -> Self {
        Self {
            adapter: Adapter::default(),
            config: RunnerConfig::default(),
            metrics: None,
        }
    }
}

impl<T, E> Builder<T, E>
where
    T: Payload,
    E: Payload,
{
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Records the runs of this runner in the given metrics instead of unregistered ones.
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn adapter(mut self, adapter: Adapter<T, E>) -> Self {
        self.adapter = adapter;
        self
    }

    /// See [`Adapter::register`].
    pub fn register<X, F>(mut self, convert: F) -> Self
    where
        X: std::any::Any + Send,
        F: Fn(X) -> Yieldable<T, E> + Send + Sync + 'static,
    {
        self.adapter.register(convert);
        self
    }

    pub fn build(self) -> Runner<T, E> {
        let mut adapter = self.adapter;
        adapter.configure(&self.config);

        Runner {
            inner: Arc::new(Inner {
                adapter,
                config: self.config,
                metrics: self.metrics.unwrap_or_default(),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

/// Everything a run needs besides its coroutine.
pub(crate) struct Scope<T, E> {
    runner: Runner<T, E>,
    id: RunId,
    depth: usize,
    abort: AbortSignal,
}

impl<T, E> Scope<T, E>
where
    T: Payload,
    E: Payload,
{
    fn root(runner: Runner<T, E>, abort: AbortSignal) -> Self {
        let id = runner.next_id();

        Self {
            runner,
            id,
            depth: 0,
            abort,
        }
    }

    /// The scope of a coroutine nested in the current one, sharing its abort signal.
    pub fn child(&self) -> Self {
        Self {
            runner: self.runner.clone(),
            id: self.runner.next_id(),
            depth: self.depth + 1,
            abort: self.abort.clone(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn abort(&self) -> &AbortSignal {
        &self.abort
    }

    pub fn metrics(&self) -> &Metrics {
        self.runner.metrics()
    }
}

/// Runs a coroutine, and every coroutine nested in it, to completion.
#[async_recursion]
pub(crate) async fn drive<T, E>(coroutine: Coroutine<T, E>, scope: Scope<T, E>) -> Result<T, Error<E>>
where
    T: Payload,
    E: Payload,
{
    let span = debug_span!("run", id = %scope.id, depth = scope.depth);

    async move {
        let metrics = scope.metrics().clone();
        let started = metrics.run_started();

        let mut instance = CoroutineInstance::new(coroutine);
        let result = step_until_done(&mut instance, &scope).await;

        let outcome = match &result {
            Ok(value) => {
                debug!(?value, steps = instance.steps(), "Coroutine completed");
                Outcome::Completed
            }
            Err(error) if error.is_fatal() => {
                error!(%error, steps = instance.steps(), "Run aborted");
                Outcome::Failed
            }
            Err(error) if error.is_cancellation() => {
                debug!(steps = instance.steps(), "Coroutine was cancelled");
                Outcome::Cancelled
            }
            Err(error) => {
                debug!(%error, steps = instance.steps(), "Coroutine failed");
                Outcome::Failed
            }
        };

        metrics.run_finished(outcome, started, instance.steps());

        result
    }
    .instrument(span)
    .await
}

async fn step_until_done<T, E>(
    instance: &mut CoroutineInstance<T, E>,
    scope: &Scope<T, E>,
) -> Result<T, Error<E>>
where
    T: Payload,
    E: Payload,
{
    let runner = &scope.runner;
    let max_steps = runner.config().max_steps;

    let mut point = instance.start()?;

    loop {
        let yieldable = match point {
            YieldPoint::Suspended(yieldable) => yieldable,
            YieldPoint::Completed(value) => return Ok(value),
            YieldPoint::Failed(error) => return Err(error),
        };

        if let Some(max_steps) = max_steps {
            if instance.steps() >= max_steps {
                return Err(Error::StepLimitExceeded { steps: max_steps });
            }
        }

        trace!(kind = yieldable.kind(), step = instance.steps(), "Coroutine suspended");

        let settled = runner.adapter().adapt(yieldable, scope).await;

        point = match settled {
            Ok(value) => {
                runner.metrics().resumes.inc();
                instance.resume(value)?
            }
            // Fatal errors of nested runs end the whole run
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                runner.metrics().throws.inc();
                instance.throw_into(error)?
            }
        };
    }
}

/// Handle on a run started with [`Runner::run`].
///
/// Resolves to the outcome of the run when awaited.
#[must_use = "dropping the handle detaches the run"]
pub struct RunHandle<T, E> {
    id: RunId,
    task: JoinHandle<Result<T, Error<E>>>,
    abort: AbortHandle,
}

impl<T, E> RunHandle<T, E>
where
    T: Payload,
    E: Payload,
{
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Throws [`Error::Cancelled`] into whichever coroutine of the run is suspended.
    ///
    /// The coroutine may recover, otherwise the run fails with [`Error::Cancelled`].
    pub fn abort(&self) {
        debug!(id = %self.id, "Aborting run");
        self.abort.abort();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Exposes the outcome of the run as a deferred value, so another coroutine can wait on it.
    pub fn into_deferred(self) -> Deferred<T, E> {
        Deferred::spawn(self)
    }
}

impl<T, E> Future for RunHandle<T, E> {
    type Output = Result<T, Error<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.task).poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(e) => Poll::Ready(Err(Error::Crashed(e.to_string()))),
        }
    }
}

impl<T, E> fmt::Debug for RunHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("id", &self.id)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}
