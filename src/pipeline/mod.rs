//! # Extension Pipeline
//!
//! Processors that run during boot, before ordinary components are built.
//!
//! 1. **Registry processors** ([`RegistryProcessor`]) may add, change or remove
//!    definitions. Statically configured processors run first, in registration
//!    order; processors declared as definitions with
//!    [`Role::RegistryProcessor`] follow, sorted by [`Order`]. A processor that
//!    registers further processor definitions gets those run in the same
//!    stage; the stage repeats until no new processor shows up, or fails with
//!    [`ContainerError::PipelineDivergence`] once the pass cap is reached.
//! 2. **Instance processors** ([`InstanceProcessor`]) are installed on the
//!    registry and bracket every later construction.
//! 3. **Post-instance callbacks** ([`SingletonsReady`]) fire once all eager
//!    singletons exist.
//!
//! Any processor failure aborts the boot with
//! [`ContainerError::InitializationFailed`].

pub mod ordering;

pub use ordering::*;

use crate::error::{BoxError, ContainerError, Result};
use crate::model::{Instance, Role};
use crate::registry::Registry;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Stage-one processor: runs against the registry before any ordinary
/// instance is built.
pub trait RegistryProcessor: Send + Sync {
    fn process(&self, registry: &Registry) -> std::result::Result<(), BoxError>;
}

/// What an instance hook decided.
pub enum HookOutcome {
    /// Continue with this instance (possibly a substitute).
    Proceed(Instance),
    /// Hand the instance to the caller but do not keep it as a singleton.
    Skip(Instance),
}

/// Stage-two processor: invoked around every construction that happens after
/// it was registered.
pub trait InstanceProcessor: Send + Sync {
    fn order(&self) -> Order {
        Order::Unordered
    }

    fn before_init(&self, _name: &str, instance: Instance) -> std::result::Result<HookOutcome, BoxError> {
        Ok(HookOutcome::Proceed(instance))
    }

    fn after_init(&self, _name: &str, instance: Instance) -> std::result::Result<HookOutcome, BoxError> {
        Ok(HookOutcome::Proceed(instance))
    }
}

/// Post-instance callback, fired after every eager singleton was built.
pub trait SingletonsReady: Send + Sync {
    fn after_singletons_instantiated(&self) -> std::result::Result<(), BoxError>;
}

/// Runs stage one to a fixed point.
pub fn invoke_registry_processors(
    registry: &Registry,
    static_processors: &[Arc<dyn RegistryProcessor>],
    max_passes: usize,
) -> Result<()> {
    for (index, processor) in static_processors.iter().enumerate() {
        debug!(index, "Invoking static registry processor");
        processor
            .process(registry)
            .map_err(|e| ContainerError::init_failed(format!("registry processor #{index}"), e))?;
    }

    let mut processed: HashSet<String> = HashSet::new();
    for pass in 0..max_passes {
        let mut pending: Vec<_> = registry
            .names_for_role(Role::RegistryProcessor)
            .into_iter()
            .filter(|(name, _)| !processed.contains(name))
            .collect();
        if pending.is_empty() {
            debug!(passes = pass, "Registry processors converged");
            return Ok(());
        }
        sort_ordered(&mut pending, |(_, order)| *order);

        for (name, _) in pending {
            processed.insert(name.clone());
            let processor = processor_bean(registry, &name, "RegistryProcessor", |instance| {
                instance.registry_processor().cloned()
            })?;
            debug!(processor = %name, pass, "Invoking registry processor");
            processor
                .process(registry)
                .map_err(|e| ContainerError::init_failed(name.as_str(), e))?;
        }
    }

    let leftover = registry
        .names_for_role(Role::RegistryProcessor)
        .into_iter()
        .any(|(name, _)| !processed.contains(&name));
    if leftover {
        return Err(ContainerError::PipelineDivergence {
            iterations: max_passes,
        });
    }
    Ok(())
}

/// Installs stage-two processors: static ones first, then definitions with
/// [`Role::InstanceProcessor`] in [`Order`]. Each processor bean is installed
/// as soon as it is built, so it already brackets the processors built after it.
pub fn register_instance_processors(
    registry: &Registry,
    static_processors: &[Arc<dyn InstanceProcessor>],
) -> Result<()> {
    let mut statics = static_processors.to_vec();
    sort_ordered(&mut statics, |p| p.order());
    for processor in statics {
        registry.add_instance_processor(processor);
    }

    let mut named = registry.names_for_role(Role::InstanceProcessor);
    sort_ordered(&mut named, |(_, order)| *order);
    for (name, _) in named {
        let processor = processor_bean(registry, &name, "InstanceProcessor", |instance| {
            instance.instance_processor().cloned()
        })?;
        registry.add_instance_processor(processor);
    }
    info!(count = registry.instance_processor_count(), "Instance processors registered");
    Ok(())
}

/// Builds the processor definition `name` and extracts its capability. Any
/// failure, including a bean without the capability, aborts the boot as
/// [`ContainerError::InitializationFailed`].
fn processor_bean<T>(
    registry: &Registry,
    name: &str,
    expected: &'static str,
    extract: impl FnOnce(&Instance) -> Option<T>,
) -> Result<T> {
    let instance = registry.resolve(name).map_err(|e| match e {
        e @ ContainerError::InitializationFailed { .. } => e,
        other => ContainerError::init_failed(name, other),
    })?;
    extract(&instance).ok_or_else(|| {
        ContainerError::init_failed(
            name,
            ContainerError::NotRequiredType {
                name: name.to_string(),
                expected,
            },
        )
    })
}

/// Notifies every built singleton exposing [`SingletonsReady`]. Definitions
/// tagged [`Role::PostInstanceProcessor`] are built first if they are lazy and
/// must expose the callback.
pub fn notify_singletons_ready(registry: &Registry) -> Result<()> {
    for (name, _) in registry.names_for_role(Role::PostInstanceProcessor) {
        processor_bean(registry, &name, "SingletonsReady", |instance| {
            instance.singletons_ready().cloned()
        })?;
    }

    let mut targets: Vec<_> = registry
        .singletons()
        .into_iter()
        .filter_map(|(name, instance)| {
            let callback = instance.singletons_ready()?.clone();
            let order = registry.definition(&name).map(|d| d.order).unwrap_or_default();
            Some((name, order, callback))
        })
        .collect();
    sort_ordered(&mut targets, |(_, order, _)| *order);

    for (name, _, callback) in targets {
        debug!(component = %name, "Singletons ready callback");
        callback
            .after_singletons_instantiated()
            .map_err(|e| ContainerError::init_failed(name.as_str(), e))?;
    }
    Ok(())
}
