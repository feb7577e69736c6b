//! The instantiation boundary: how definitions become instances.

use crate::error::{BoxError, ContainerError, Result};
use crate::model::{Definition, Instance};
use crate::registry::Registry;
use std::any::Any;
use std::sync::Arc;

/// Builds an instance from a definition. Implementations look up collaborators
/// through the [`Resolver`] so the registry can track who depends on whom.
pub trait Instantiator: Send + Sync {
    fn instantiate(
        &self,
        name: &str,
        definition: &Definition,
        resolver: &Resolver<'_>,
    ) -> std::result::Result<Instance, BoxError>;
}

/// Default instantiator: calls the supplier attached to the definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupplierInstantiator;

impl Instantiator for SupplierInstantiator {
    fn instantiate(
        &self,
        name: &str,
        definition: &Definition,
        resolver: &Resolver<'_>,
    ) -> std::result::Result<Instance, BoxError> {
        let supplier = definition
            .get_supplier()
            .ok_or_else(|| format!("definition '{name}' has no supplier"))?;
        supplier(resolver)
    }
}

/// Lookup handle passed to instantiators. Every resolution through it is
/// recorded as a dependency of the component under construction.
pub struct Resolver<'a> {
    registry: &'a Registry,
    requester: &'a str,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(registry: &'a Registry, requester: &'a str) -> Self {
        Self { registry, requester }
    }

    /// Name of the component being built.
    pub fn requester(&self) -> &str {
        self.requester
    }

    pub fn get(&self, name: &str) -> Result<Instance> {
        self.registry.resolve_for(name, Some(self.requester))
    }

    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        let instance = self.get(name)?;
        instance
            .downcast::<T>()
            .ok_or_else(|| ContainerError::NotRequiredType {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }
}
