//! # Container Configuration
//!
//! [`ContainerSettings`] holds the tunables of one container and can be read
//! from `CONTAINER_*` environment variables. [`ContainerConfig`] bundles the
//! settings with everything a boot needs: the environment, the definition
//! loader, the instantiator and the statically registered extension points.
//!
//! Nothing here is global; every container gets its own config.

use crate::error::BoxError;
use crate::events::EventListener;
use crate::model::Environment;
use crate::pipeline::{InstanceProcessor, RegistryProcessor};
use crate::registry::{DefinitionLoader, DefinitionSet, Instantiator, Registry, SupplierInstantiator};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// Whether a later registration may replace a definition of the same name.
    pub allow_definition_overriding: bool,
    /// Pass cap for the registry processor stage.
    pub max_pipeline_iterations: usize,
    /// Stop delivering an event after the first failing listener.
    pub listener_fail_fast: bool,
    /// How long shutdown waits for each asynchronous stop. `None` waits forever.
    pub stop_timeout: Option<Duration>,
    /// Start the members of a phase group concurrently.
    pub parallel_start: bool,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            allow_definition_overriding: true,
            max_pipeline_iterations: 16,
            listener_fail_fast: false,
            stop_timeout: None,
            parallel_start: true,
        }
    }
}

impl ContainerSettings {
    /// Reads `CONTAINER_ALLOW_OVERRIDING`, `CONTAINER_MAX_PIPELINE_ITERATIONS`,
    /// `CONTAINER_LISTENER_FAIL_FAST`, `CONTAINER_STOP_TIMEOUT_MS` and
    /// `CONTAINER_PARALLEL_START`. Unset or invalid values keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            allow_definition_overriding: parse_or(
                &lookup,
                "CONTAINER_ALLOW_OVERRIDING",
                defaults.allow_definition_overriding,
            ),
            max_pipeline_iterations: parse_or(
                &lookup,
                "CONTAINER_MAX_PIPELINE_ITERATIONS",
                defaults.max_pipeline_iterations,
            ),
            listener_fail_fast: parse_or(
                &lookup,
                "CONTAINER_LISTENER_FAIL_FAST",
                defaults.listener_fail_fast,
            ),
            stop_timeout: lookup("CONTAINER_STOP_TIMEOUT_MS")
                .and_then(|raw| match raw.trim().parse::<u64>() {
                    Ok(ms) => Some(Duration::from_millis(ms)),
                    Err(e) => {
                        warn!(key = "CONTAINER_STOP_TIMEOUT_MS", value = %raw, error = %e, "Ignoring invalid setting");
                        None
                    }
                })
                .or(defaults.stop_timeout),
            parallel_start: parse_or(&lookup, "CONTAINER_PARALLEL_START", defaults.parallel_start),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!(key, value = %raw, error = %e, "Ignoring invalid setting");
            default
        }),
        None => default,
    }
}

/// Runs before property validation and may adjust the environment.
pub trait ContainerInitializer: Send + Sync {
    fn initialize(&self, environment: &mut Environment) -> Result<(), BoxError>;
}

/// Extension point invoked once the registry is prepared and again on close.
pub trait RefreshHook: Send + Sync {
    fn on_refresh(&self, registry: &Registry) -> Result<(), BoxError>;

    fn on_close(&self) {}
}

/// Everything needed to boot one container.
///
/// ```rust
/// use container_lifecycle::lifecycle::ContainerConfig;
/// use container_lifecycle::model::{Definition, Instance};
/// use container_lifecycle::registry::DefinitionSet;
///
/// let config = ContainerConfig::new("app").with_definitions(
///     DefinitionSet::new().with("greeting", Definition::of(|_| Ok(Instance::new("hello")))),
/// );
/// assert_eq!(config.id, "app");
/// ```
#[derive(Clone)]
pub struct ContainerConfig {
    pub id: String,
    pub environment: Environment,
    pub settings: ContainerSettings,
    pub(crate) loader: Arc<dyn DefinitionLoader>,
    pub(crate) instantiator: Arc<dyn Instantiator>,
    pub(crate) initializers: Vec<Arc<dyn ContainerInitializer>>,
    pub(crate) registry_processors: Vec<Arc<dyn RegistryProcessor>>,
    pub(crate) instance_processors: Vec<Arc<dyn InstanceProcessor>>,
    pub(crate) listeners: Vec<Arc<dyn EventListener>>,
    pub(crate) refresh_hook: Option<Arc<dyn RefreshHook>>,
}

impl ContainerConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            environment: Environment::new(),
            settings: ContainerSettings::default(),
            loader: Arc::new(DefinitionSet::new()),
            instantiator: Arc::new(SupplierInstantiator),
            initializers: Vec::new(),
            registry_processors: Vec::new(),
            instance_processors: Vec::new(),
            listeners: Vec::new(),
            refresh_hook: None,
        }
    }

    pub fn with_definitions(self, definitions: DefinitionSet) -> Self {
        self.with_loader(Arc::new(definitions))
    }

    pub fn with_loader(mut self, loader: Arc<dyn DefinitionLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_instantiator(mut self, instantiator: Arc<dyn Instantiator>) -> Self {
        self.instantiator = instantiator;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_initializer(mut self, initializer: Arc<dyn ContainerInitializer>) -> Self {
        self.initializers.push(initializer);
        self
    }

    pub fn with_registry_processor(mut self, processor: Arc<dyn RegistryProcessor>) -> Self {
        self.registry_processors.push(processor);
        self
    }

    pub fn with_instance_processor(mut self, processor: Arc<dyn InstanceProcessor>) -> Self {
        self.instance_processors.push(processor);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_refresh_hook(mut self, hook: Arc<dyn RefreshHook>) -> Self {
        self.refresh_hook = Some(hook);
        self
    }
}
