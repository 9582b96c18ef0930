use core::fmt;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use derive_where::derive_where;
use futures::future::select_all;
use tokio::sync::oneshot;
use tracing::{trace, warn};

use coflow_config::RunnerConfig;

use crate::awaitable::Awaitable;
use crate::error::Error;
use crate::runner::{drive, Scope};
use crate::yieldable::{Callback, Yieldable};
use crate::Payload;

type Converter<T, E> = Arc<dyn Fn(Box<dyn Any + Send>) -> Option<Yieldable<T, E>> + Send + Sync>;

/// Converts whatever a coroutine yields into an [`Awaitable`].
///
/// Values of foreign types, yielded as [`Yieldable::Opaque`], are only
/// understood once a converter has been registered for their type.
#[derive_where(Clone)]
pub struct Adapter<T, E> {
    converters: HashMap<TypeId, Converter<T, E>>,
    default_timeout: Option<Duration>,
    max_nesting_depth: usize,
}

impl<T, E> Adapter<T, E>
where
    T: Payload,
    E: Payload,
{
    pub fn new() -> Self {
        Self::with_config(&RunnerConfig::default())
    }

    pub fn with_config(config: &RunnerConfig) -> Self {
        Self {
            converters: HashMap::new(),
            default_timeout: config.default_timeout,
            max_nesting_depth: config.max_nesting_depth,
        }
    }

    pub(crate) fn configure(&mut self, config: &RunnerConfig) {
        self.default_timeout = config.default_timeout;
        self.max_nesting_depth = config.max_nesting_depth;
    }

    /// Teaches the adapter how to wait on values of type `X`.
    ///
    /// Replaces any converter previously registered for that type.
    pub fn register<X, F>(&mut self, convert: F)
    where
        X: Any + Send,
        F: Fn(X) -> Yieldable<T, E> + Send + Sync + 'static,
    {
        let converter: Converter<T, E> = Arc::new(move |value: Box<dyn Any + Send>| {
            value.downcast::<X>().ok().map(|value| convert(*value))
        });

        self.converters.insert(TypeId::of::<X>(), converter);
    }

    pub fn supports<X: Any>(&self) -> bool {
        self.converters.contains_key(&TypeId::of::<X>())
    }

    pub(crate) fn adapt(&self, yieldable: Yieldable<T, E>, scope: &Scope<T, E>) -> Awaitable<T, E> {
        trace!(kind = yieldable.kind(), "Adapting yieldable");

        match yieldable {
            Yieldable::Immediate(value) => self.leaf(Awaitable::ready(Ok(value)), scope),

            Yieldable::Thunk(thunk) => {
                let (callback, rx) = Callback::channel(scope.metrics().clone());
                thunk.accept(callback);
                self.leaf(Awaitable::from_receiver(rx), scope)
            }

            Yieldable::Deferred(deferred) => {
                let (tx, rx) = oneshot::channel();
                deferred.on_settle(move |result| {
                    // The receiver is gone if the run moved on without this value
                    let _ = tx.send(result);
                });
                self.leaf(Awaitable::from_receiver(rx), scope)
            }

            Yieldable::Nested(coroutine) => {
                if scope.depth() >= self.max_nesting_depth {
                    warn!(depth = scope.depth(), "Refusing to nest coroutine any deeper");

                    return Awaitable::ready(Err(Error::NestingTooDeep {
                        depth: self.max_nesting_depth,
                    }));
                }

                Awaitable::from_future(drive(coroutine, scope.child()))
            }

            Yieldable::Race(contenders) => {
                if contenders.is_empty() {
                    return self.unsupported("empty race", scope);
                }

                let contenders: Vec<_> = contenders
                    .into_iter()
                    .map(|contender| self.adapt(contender, scope))
                    .collect();

                Awaitable::from_future(async move {
                    let (result, index, _) = select_all(contenders).await;
                    trace!(index, "Race settled");
                    result
                })
            }

            Yieldable::Opaque(opaque) => {
                let type_name = opaque.type_name();

                let converted = self
                    .converters
                    .get(&opaque.value_type_id())
                    .and_then(|convert| convert(opaque.into_value()));

                match converted {
                    // A converter must make progress, or it could convert forever
                    Some(Yieldable::Opaque(opaque)) => self.unsupported(opaque.type_name(), scope),
                    Some(yieldable) => self.adapt(yieldable, scope),
                    None => self.unsupported(type_name, scope),
                }
            }
        }
    }

    /// Applies the default timeout and the abort signal to an awaitable of a single operation.
    fn leaf(&self, awaitable: Awaitable<T, E>, scope: &Scope<T, E>) -> Awaitable<T, E> {
        let awaitable = match self.default_timeout {
            Some(timeout) => awaitable.with_timeout(timeout),
            None => awaitable,
        };

        awaitable.or_cancelled(scope.abort().clone().requested())
    }

    fn unsupported(&self, type_name: &'static str, scope: &Scope<T, E>) -> Awaitable<T, E> {
        warn!(type_name, "Coroutine yielded an unsupported value");

        scope.metrics().unsupported_yieldables.inc();

        Awaitable::ready(Err(Error::UnsupportedYieldable { type_name }))
    }
}

impl<T, E> Default for Adapter<T, E>
where
    T: Payload,
    E: Payload,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Adapter<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("converters", &self.converters.len())
            .field("default_timeout", &self.default_timeout)
            .field("max_nesting_depth", &self.max_nesting_depth)
            .finish()
    }
}
