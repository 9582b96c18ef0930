use std::borrow::Cow;
use std::sync::{Arc, OnceLock, RwLock};

use prometheus_client::registry::Registry;

type Label = (Cow<'static, str>, Cow<'static, str>);

/// A Prometheus registry which can be shared between runners.
///
/// Handles obtained through [`SharedRegistry::with_label`] write into the same
/// underlying registry, labelling whatever is registered through them.
#[derive(Clone)]
pub struct SharedRegistry {
    label: Option<Label>,
    registry: Arc<RwLock<Registry>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            label: None,
            registry: Arc::new(RwLock::new(registry)),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<SharedRegistry> = OnceLock::new();
        REGISTRY.get_or_init(SharedRegistry::default)
    }

    /// Returns a handle on the same registry which adds the `key="value"` label
    /// to every metric registered through it, eg. to tell several runners apart.
    pub fn with_label(&self, key: &'static str, value: impl Into<String>) -> Self {
        Self {
            label: Some((Cow::Borrowed(key), Cow::Owned(value.into()))),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Registers metrics in a sub-registry whose metric names all start with `prefix`.
    pub fn with_prefix<A>(&self, prefix: impl AsRef<str>, f: impl FnOnce(&mut Registry) -> A) -> A {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let sub_registry = registry.sub_registry_with_prefix(prefix);

        match &self.label {
            Some(label) => f(sub_registry.sub_registry_with_label(label.clone())),
            None => f(sub_registry),
        }
    }

    /// Encodes every metric in this registry using the OpenMetrics text format.
    pub fn encode<W: core::fmt::Write>(&self, writer: &mut W) -> core::fmt::Result {
        let registry = self
            .registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        prometheus_client::encoding::text::encode(writer, &registry)
    }
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new(Registry::default())
    }
}

/// Encodes the metrics of the global registry.
pub fn export<W: core::fmt::Write>(writer: &mut W) -> core::fmt::Result {
    SharedRegistry::global().encode(writer)
}
