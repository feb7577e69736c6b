use crate::error::BoxError;
use crate::model::Instance;
use crate::pipeline::Order;
use crate::registry::Resolver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Closure used by [`SupplierInstantiator`](crate::registry::SupplierInstantiator)
/// to build an instance. Dependencies are looked up through the [`Resolver`],
/// which records them for destruction ordering.
pub type Supplier =
    Arc<dyn Fn(&Resolver<'_>) -> Result<Instance, BoxError> + Send + Sync>;

/// How many instances a definition produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scope {
    /// One shared instance per registry, destroyed at shutdown.
    #[default]
    Singleton,
    /// A fresh instance on every lookup; the registry never destroys it.
    Prototype,
}

/// Tag the pipeline and the event bus use to discover special definitions
/// without building them first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    Application,
    RegistryProcessor,
    InstanceProcessor,
    /// Exposes [`SingletonsReady`](crate::pipeline::SingletonsReady).
    PostInstanceProcessor,
    Listener,
}

/// Describes how to build a named component.
///
/// The engine only looks at scope, laziness, declared dependencies, hook names,
/// role and order. Everything else about the component is left to the
/// [`Instantiator`](crate::registry::Instantiator).
///
/// ```rust
/// use container_lifecycle::model::{Definition, Instance};
///
/// let def = Definition::singleton()
///     .depends_on("database")
///     .destroy_hook("flush")
///     .supplier(|_| Ok(Instance::new(42u32)));
/// assert!(!def.lazy);
/// ```
#[derive(Clone, Default)]
pub struct Definition {
    pub scope: Scope,
    pub lazy: bool,
    pub role: Role,
    pub order: Order,
    pub depends_on: Vec<String>,
    pub init_hook: Option<String>,
    pub destroy_hook: Option<String>,
    supplier: Option<Supplier>,
}

impl Definition {
    pub fn singleton() -> Self {
        Self::default()
    }

    pub fn prototype() -> Self {
        Self {
            scope: Scope::Prototype,
            ..Self::default()
        }
    }

    /// Shorthand for a singleton built by `supplier`.
    pub fn of<F>(supplier: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> Result<Instance, BoxError> + Send + Sync + 'static,
    {
        Self::singleton().supplier(supplier)
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn init_hook(mut self, name: impl Into<String>) -> Self {
        self.init_hook = Some(name.into());
        self
    }

    pub fn destroy_hook(mut self, name: impl Into<String>) -> Self {
        self.destroy_hook = Some(name.into());
        self
    }

    pub fn supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> Result<Instance, BoxError> + Send + Sync + 'static,
    {
        self.supplier = Some(Arc::new(supplier));
        self
    }

    pub fn get_supplier(&self) -> Option<&Supplier> {
        self.supplier.as_ref()
    }

    pub fn is_singleton(&self) -> bool {
        self.scope == Scope::Singleton
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("scope", &self.scope)
            .field("lazy", &self.lazy)
            .field("role", &self.role)
            .field("order", &self.order)
            .field("depends_on", &self.depends_on)
            .field("init_hook", &self.init_hook)
            .field("destroy_hook", &self.destroy_hook)
            .field("has_supplier", &self.supplier.is_some())
            .finish()
    }
}
