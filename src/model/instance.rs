//! # Built Instances
//!
//! An [`Instance`] is the opaque value a definition produces, plus the roles it
//! chooses to expose to the engine. Rust has no runtime interface checks, so a
//! component that wants to receive events, take part in phased start/stop or
//! act as a processor says so explicitly when it is built:
//!
//! ```rust
//! use container_lifecycle::model::Instance;
//! use container_lifecycle::events::EventListener;
//! use container_lifecycle::model::Event;
//! use container_lifecycle::error::BoxError;
//! use std::sync::Arc;
//!
//! struct Audit;
//! impl EventListener for Audit {
//!     fn on_event(&self, _event: &Event) -> Result<(), BoxError> { Ok(()) }
//! }
//!
//! let audit = Arc::new(Audit);
//! let instance = Instance::from_arc(audit.clone()).with_listener(audit);
//! assert!(instance.listener().is_some());
//! assert!(instance.downcast::<Audit>().is_some());
//! ```

use crate::error::BoxError;
use crate::events::EventListener;
use crate::lifecycle::MessageSource;
use crate::phase::Lifecycle;
use crate::pipeline::{InstanceProcessor, RegistryProcessor, SingletonsReady};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Releases resources when the owning registry destroys its singletons.
pub trait Disposable: Send + Sync {
    fn destroy(&self) -> Result<(), BoxError>;
}

/// A named init or destroy callback, referenced from a definition by name.
pub type Hook = Arc<dyn Fn() -> Result<(), BoxError> + Send + Sync>;

#[derive(Clone, Default)]
struct Roles {
    listener: Option<Arc<dyn EventListener>>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
    disposable: Option<Arc<dyn Disposable>>,
    registry_processor: Option<Arc<dyn RegistryProcessor>>,
    instance_processor: Option<Arc<dyn InstanceProcessor>>,
    singletons_ready: Option<Arc<dyn SingletonsReady>>,
    message_source: Option<Arc<dyn MessageSource>>,
    hooks: HashMap<String, Hook>,
}

/// A built component. Cloning is cheap and shares the underlying value.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    roles: Roles,
}

impl Instance {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            type_name: std::any::type_name::<T>(),
            roles: Roles::default(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.roles.listener = Some(listener);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.roles.lifecycle = Some(lifecycle);
        self
    }

    pub fn with_disposable(mut self, disposable: Arc<dyn Disposable>) -> Self {
        self.roles.disposable = Some(disposable);
        self
    }

    pub fn with_registry_processor(mut self, processor: Arc<dyn RegistryProcessor>) -> Self {
        self.roles.registry_processor = Some(processor);
        self
    }

    pub fn with_instance_processor(mut self, processor: Arc<dyn InstanceProcessor>) -> Self {
        self.roles.instance_processor = Some(processor);
        self
    }

    pub fn with_singletons_ready(mut self, callback: Arc<dyn SingletonsReady>) -> Self {
        self.roles.singletons_ready = Some(callback);
        self
    }

    pub fn with_message_source(mut self, source: Arc<dyn MessageSource>) -> Self {
        self.roles.message_source = Some(source);
        self
    }

    pub fn with_hook<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.roles.hooks.insert(name.into(), Arc::new(hook));
        self
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Identity comparison: true when both handles share the same value.
    pub fn same_as(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    pub fn listener(&self) -> Option<&Arc<dyn EventListener>> {
        self.roles.listener.as_ref()
    }

    pub fn lifecycle(&self) -> Option<&Arc<dyn Lifecycle>> {
        self.roles.lifecycle.as_ref()
    }

    pub fn disposable(&self) -> Option<&Arc<dyn Disposable>> {
        self.roles.disposable.as_ref()
    }

    pub fn registry_processor(&self) -> Option<&Arc<dyn RegistryProcessor>> {
        self.roles.registry_processor.as_ref()
    }

    pub fn instance_processor(&self) -> Option<&Arc<dyn InstanceProcessor>> {
        self.roles.instance_processor.as_ref()
    }

    pub fn singletons_ready(&self) -> Option<&Arc<dyn SingletonsReady>> {
        self.roles.singletons_ready.as_ref()
    }

    pub fn message_source(&self) -> Option<&Arc<dyn MessageSource>> {
        self.roles.message_source.as_ref()
    }

    pub fn hook(&self, name: &str) -> Option<&Hook> {
        self.roles.hooks.get(name)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_name)
            .field("listener", &self.roles.listener.is_some())
            .field("lifecycle", &self.roles.lifecycle.is_some())
            .field("disposable", &self.roles.disposable.is_some())
            .field("hooks", &self.roles.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_and_identity() {
        let instance = Instance::new(String::from("payload"));
        let clone = instance.clone();

        assert_eq!(instance.downcast::<String>().unwrap().as_str(), "payload");
        assert!(instance.downcast::<u32>().is_none());
        assert!(instance.same_as(&clone));
        assert!(!instance.same_as(&Instance::new(String::from("payload"))));
    }

    #[test]
    fn test_named_hooks() {
        let instance = Instance::new(1u8).with_hook("close", || Ok(()));
        assert!(instance.hook("close").is_some());
        assert!(instance.hook("open").is_none());
    }
}
