// For coverage on nightly
#![allow(unexpected_cfgs)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod metrics;
pub use metrics::{Metrics, Outcome};

mod registry;
pub use registry::{export, SharedRegistry};

pub use prometheus_client::metrics::counter::Counter;
pub use prometheus_client::metrics::family::Family;
pub use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
pub use prometheus_client::registry::Registry;

pub mod prometheus {
    pub use prometheus_client::*;
}
