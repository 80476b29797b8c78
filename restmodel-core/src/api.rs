//! The model registry.

use crate::action::lock;
use crate::config::ApiConfig;
use crate::error::{RestError, RestResult};
use crate::model::{Model, ModelBuilder};
use crate::transport::Transport;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

pub(crate) struct Registry {
    config: ApiConfig,
    transport: Arc<dyn Transport>,
    models: Mutex<HashMap<String, Model>>,
}

/// Entry point: shared configuration, the transport, and the registry used
/// to resolve relation targets by name.
///
/// Models keep a weak reference to their `Api`; name-based relation
/// targets only resolve while it is alive.
#[derive(Clone)]
pub struct Api {
    inner: Arc<Registry>,
}

impl Api {
    /// Creates an API with the default configuration.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, ApiConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: ApiConfig) -> Self {
        Self {
            inner: Arc::new(Registry {
                config,
                transport,
                models: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn from_registry(inner: Arc<Registry>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<Registry> {
        Arc::downgrade(&self.inner)
    }

    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Starts defining a model.
    pub fn define(&self, name: &str) -> ModelBuilder {
        ModelBuilder::new(self.clone(), name)
    }

    /// Looks up a registered model.
    pub fn model(&self, name: &str) -> RestResult<Model> {
        lock(&self.inner.models)
            .get(name)
            .cloned()
            .ok_or_else(|| RestError::UnknownModel(name.to_string()))
    }

    /// Names of all registered models, sorted.
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inner.models).keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn register(&self, model: Model) {
        lock(&self.inner.models).insert(model.name().to_string(), model);
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("config", &self.inner.config)
            .field("models", &self.model_names())
            .finish()
    }
}
