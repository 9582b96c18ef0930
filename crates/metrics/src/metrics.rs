use std::ops::Deref;
use std::sync::Arc;
use std::time::Instant;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};

use crate::SharedRegistry;

#[derive(Clone, Debug)]
pub struct Metrics(Arc<Inner>);

impl Deref for Metrics {
    type Target = Inner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// How a run terminated.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

/// Label set for the `runs_finished` metric.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RunOutcome {
    outcome: Outcome,
}

#[derive(Debug)]
pub struct Inner {
    /// Number of runs started, nested runs included
    pub runs_started: Counter,

    /// Number of runs which reached a terminal state, by outcome
    runs_finished: Family<RunOutcome, Counter>,

    /// Number of runs currently in flight
    pub active_runs: Gauge,

    /// Number of times a coroutine was resumed with a value
    pub resumes: Counter,

    /// Number of times an error was thrown into a coroutine
    pub throws: Counter,

    /// Number of thunk callback settlements discarded because the callback had already settled
    pub double_settlements: Counter,

    /// Number of settlements which arrived after their run had moved on
    pub stale_settlements: Counter,

    /// Number of yielded values the adapter could not convert
    pub unsupported_yieldables: Counter,

    /// Number of steps taken by a run before it terminated
    pub steps_per_run: Histogram,

    /// Wall-clock duration of a run, in seconds
    pub run_time: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            runs_started: Counter::default(),
            runs_finished: Family::default(),
            active_runs: Gauge::default(),
            resumes: Counter::default(),
            throws: Counter::default(),
            double_settlements: Counter::default(),
            stale_settlements: Counter::default(),
            unsupported_yieldables: Counter::default(),
            steps_per_run: Histogram::new(exponential_buckets(1.0, 2.0, 12)),
            run_time: Histogram::new(exponential_buckets(0.001, 2.0, 16)),
        }))
    }

    pub fn register(registry: &SharedRegistry) -> Self {
        Self::register_with_prefix(registry, "coflow_runner")
    }

    pub fn register_with_prefix(registry: &SharedRegistry, prefix: &str) -> Self {
        let metrics = Self::new();

        registry.with_prefix(prefix, |registry| {
            registry.register(
                "runs_started",
                "Number of runs started, nested runs included",
                metrics.runs_started.clone(),
            );

            registry.register(
                "runs_finished",
                "Number of runs which reached a terminal state, by outcome",
                metrics.runs_finished.clone(),
            );

            registry.register(
                "active_runs",
                "Number of runs currently in flight",
                metrics.active_runs.clone(),
            );

            registry.register(
                "resumes",
                "Number of times a coroutine was resumed with a value",
                metrics.resumes.clone(),
            );

            registry.register(
                "throws",
                "Number of times an error was thrown into a coroutine",
                metrics.throws.clone(),
            );

            registry.register(
                "double_settlements",
                "Number of thunk callback settlements discarded because the callback had already settled",
                metrics.double_settlements.clone(),
            );

            registry.register(
                "stale_settlements",
                "Number of settlements which arrived after their run had moved on",
                metrics.stale_settlements.clone(),
            );

            registry.register(
                "unsupported_yieldables",
                "Number of yielded values the adapter could not convert",
                metrics.unsupported_yieldables.clone(),
            );

            registry.register(
                "steps_per_run",
                "Number of steps taken by a run before it terminated",
                metrics.steps_per_run.clone(),
            );

            registry.register(
                "run_time",
                "Wall-clock duration of a run, in seconds",
                metrics.run_time.clone(),
            );
        });

        metrics
    }

    /// Records the start of a run and returns the instant to hand back to [`Metrics::run_finished`].
    pub fn run_started(&self) -> Instant {
        self.runs_started.inc();
        self.active_runs.inc();
        Instant::now()
    }

    pub fn run_finished(&self, outcome: Outcome, started: Instant, steps: u64) {
        self.active_runs.dec();
        self.runs_finished
            .get_or_create(&RunOutcome { outcome })
            .inc();
        self.steps_per_run.observe(steps as f64);
        self.run_time.observe(started.elapsed().as_secs_f64());
    }

    pub fn runs_finished(&self, outcome: Outcome) -> u64 {
        self.runs_finished
            .get_or_create(&RunOutcome { outcome })
            .get()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
