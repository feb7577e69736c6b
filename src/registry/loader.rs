//! The definition-loading boundary.

use crate::error::BoxError;
use crate::model::Definition;
use crate::registry::Registry;

/// Supplies definitions to a fresh registry during boot.
pub trait DefinitionLoader: Send + Sync {
    fn load(&self, registry: &Registry) -> Result<(), BoxError>;
}

/// Programmatic loader: a list of definitions and aliases registered in order.
#[derive(Debug, Clone, Default)]
pub struct DefinitionSet {
    definitions: Vec<(String, Definition)>,
    aliases: Vec<(String, String)>,
}

impl DefinitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, definition: Definition) -> Self {
        self.definitions.push((name.into(), definition));
        self
    }

    pub fn alias(mut self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aliases.push((name.into(), alias.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl DefinitionLoader for DefinitionSet {
    fn load(&self, registry: &Registry) -> Result<(), BoxError> {
        for (name, definition) in &self.definitions {
            registry.register(name.clone(), definition.clone())?;
        }
        for (name, alias) in &self.aliases {
            registry.register_alias(name, alias.clone())?;
        }
        Ok(())
    }
}
