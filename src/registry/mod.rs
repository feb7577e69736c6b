//! # Component Registry
//!
//! The hierarchical store behind every container: names map to definitions,
//! singleton definitions map to at most one built instance, and lookups that
//! miss locally are delegated to an optional parent registry.
//!
//! ## Resolution
//!
//! [`Registry::resolve`] checks, in order: the local singleton cache, local
//! resolvable dependencies, local definitions (building the instance on
//! demand), and finally the parent. A parent is held through a `Weak` handle:
//! the registry never keeps its parent alive and never destroys it.
//!
//! ## Dependency tracking
//!
//! Dependencies come from two places: `depends_on` on the definition, and
//! lookups made through the [`Resolver`] while an instance is being built.
//! [`Registry::destroy_all`] uses both so that a component is always destroyed
//! before the components it depends on.
//!
//! ## Concurrency
//!
//! All bookkeeping sits behind one `Mutex` that is never held while user code
//! runs. Two threads racing to build the same singleton are serialized through
//! a `Condvar`. The same thread coming back for a singleton it is still
//! building is a cycle and fails with [`ContainerError::CurrentlyInCreation`].
//! So is a thread about to wait on a chain of owners that ends at itself:
//! two threads building `a` and `b`, each needing the other, fail instead of
//! waiting on each other forever.

pub mod loader;
pub mod resolver;

pub use loader::*;
pub use resolver::*;

use crate::error::{ContainerError, Result};
use crate::model::{Definition, Instance, Role, Scope};
use crate::pipeline::{HookOutcome, InstanceProcessor, Order};
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

#[derive(Default)]
struct RegistryState {
    definitions: HashMap<String, Definition>,
    definition_order: Vec<String>,
    aliases: HashMap<String, String>,
    singletons: HashMap<String, Instance>,
    singleton_order: Vec<String>,
    resolvable: HashMap<String, Instance>,
    ignored: HashSet<String>,
    in_creation: HashMap<String, ThreadId>,
    /// thread -> singleton it is blocked on
    waiting: HashMap<ThreadId, String>,
    /// dependency -> components that depend on it
    dependents: HashMap<String, Vec<String>>,
    /// component -> its dependencies
    dependencies: HashMap<String, Vec<String>>,
    instance_processors: Vec<Arc<dyn InstanceProcessor>>,
}

pub struct Registry {
    id: String,
    parent: Option<Weak<Registry>>,
    instantiator: Arc<dyn Instantiator>,
    allow_overriding: bool,
    frozen: AtomicBool,
    state: Mutex<RegistryState>,
    creation: Condvar,
}

impl Registry {
    pub fn new(id: impl Into<String>, instantiator: Arc<dyn Instantiator>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            instantiator,
            allow_overriding: true,
            frozen: AtomicBool::new(false),
            state: Mutex::new(RegistryState::default()),
            creation: Condvar::new(),
        }
    }

    pub fn with_parent(mut self, parent: &Arc<Registry>) -> Self {
        self.parent = Some(Arc::downgrade(parent));
        self
    }

    pub fn allow_overriding(mut self, allow: bool) -> Self {
        self.allow_overriding = allow;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<Arc<Registry>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Definitions
    // -------------------------------------------------------------------------

    pub fn register(&self, name: impl Into<String>, definition: Definition) -> Result<()> {
        let name = name.into();
        if self.is_frozen() {
            return Err(ContainerError::DuplicateDefinition {
                name,
                reason: "registry is frozen".into(),
            });
        }
        let mut state = self.state();
        if state.definitions.contains_key(&name) {
            if !self.allow_overriding {
                return Err(ContainerError::DuplicateDefinition {
                    name,
                    reason: "already defined and overriding is disabled".into(),
                });
            }
            debug!(registry = %self.id, component = %name, "Overriding definition");
        } else {
            state.definition_order.push(name.clone());
        }
        state.aliases.remove(&name);
        state.definitions.insert(name, definition);
        Ok(())
    }

    pub fn register_alias(&self, name: &str, alias: impl Into<String>) -> Result<()> {
        let alias = alias.into();
        if self.is_frozen() {
            return Err(ContainerError::DuplicateDefinition {
                name: alias,
                reason: "registry is frozen".into(),
            });
        }
        if alias == name {
            return Ok(());
        }
        let mut state = self.state();
        if state.definitions.contains_key(&alias) {
            return Err(ContainerError::DuplicateDefinition {
                name: alias,
                reason: format!("cannot alias '{name}': a definition already uses this name"),
            });
        }
        state.aliases.insert(alias, name.to_string());
        Ok(())
    }

    /// Removes a definition. An instance already built from it stays
    /// registered until [`destroy_all`](Self::destroy_all).
    pub fn remove_definition(&self, name: &str) -> Result<Definition> {
        if self.is_frozen() {
            return Err(ContainerError::DuplicateDefinition {
                name: name.to_string(),
                reason: "registry is frozen".into(),
            });
        }
        let canonical = self.canonical_name(name);
        let mut state = self.state();
        let definition = state
            .definitions
            .remove(&canonical)
            .ok_or_else(|| ContainerError::NoSuchDefinition(name.to_string()))?;
        state.definition_order.retain(|n| n != &canonical);
        state.aliases.retain(|_, target| target != &canonical);
        Ok(definition)
    }

    /// Registers an externally built singleton under `name`.
    pub fn register_singleton(&self, name: impl Into<String>, instance: Instance) -> Result<()> {
        let name = name.into();
        let mut state = self.state();
        if state.singletons.contains_key(&name) {
            return Err(ContainerError::DuplicateDefinition {
                name,
                reason: "a singleton is already registered under this name".into(),
            });
        }
        state.singleton_order.push(name.clone());
        state.singletons.insert(name, instance);
        Ok(())
    }

    /// A value that resolves by name but is not managed: never listed as a
    /// singleton and never destroyed.
    pub fn register_resolvable_dependency(&self, name: impl Into<String>, instance: Instance) {
        self.state().resolvable.insert(name.into(), instance);
    }

    /// Lookups of `name` are no longer recorded as dependencies.
    pub fn ignore_dependency(&self, name: impl Into<String>) {
        self.state().ignored.insert(name.into());
    }

    pub fn add_instance_processor(&self, processor: Arc<dyn InstanceProcessor>) {
        self.state().instance_processors.push(processor);
    }

    pub fn instance_processor_count(&self) -> usize {
        self.state().instance_processors.len()
    }

    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    pub fn canonical_name(&self, name: &str) -> String {
        let state = self.state();
        let mut current = name;
        // Alias chains are short; the bound guards against alias loops.
        for _ in 0..=state.aliases.len() {
            match state.aliases.get(current) {
                Some(target) => current = target,
                None => break,
            }
        }
        current.to_string()
    }

    pub fn contains_local(&self, name: &str) -> bool {
        let canonical = self.canonical_name(name);
        let state = self.state();
        state.definitions.contains_key(&canonical)
            || state.singletons.contains_key(&canonical)
            || state.resolvable.contains_key(&canonical)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contains_local(name) || self.parent().is_some_and(|p| p.contains(name))
    }

    pub fn definition(&self, name: &str) -> Option<Definition> {
        let canonical = self.canonical_name(name);
        self.state().definitions.get(&canonical).cloned()
    }

    pub fn definition_names(&self) -> Vec<String> {
        self.state().definition_order.clone()
    }

    pub fn definition_count(&self) -> usize {
        self.state().definitions.len()
    }

    /// Local definitions carrying `role`, in registration order.
    pub fn names_for_role(&self, role: Role) -> Vec<(String, Order)> {
        let state = self.state();
        state
            .definition_order
            .iter()
            .filter_map(|name| {
                let def = state.definitions.get(name)?;
                (def.role == role).then(|| (name.clone(), def.order))
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Singletons & dependencies
    // -------------------------------------------------------------------------

    /// Built local singletons, in creation order.
    pub fn singletons(&self) -> Vec<(String, Instance)> {
        let state = self.state();
        state
            .singleton_order
            .iter()
            .filter_map(|name| Some((name.clone(), state.singletons.get(name)?.clone())))
            .collect()
    }

    pub fn singleton_names(&self) -> Vec<String> {
        self.state().singleton_order.clone()
    }

    pub fn singleton_count(&self) -> usize {
        self.state().singletons.len()
    }

    pub fn contains_singleton(&self, name: &str) -> bool {
        let canonical = self.canonical_name(name);
        self.state().singletons.contains_key(&canonical)
    }

    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.state().dependencies.get(name).cloned().unwrap_or_default()
    }

    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.state().dependents.get(name).cloned().unwrap_or_default()
    }

    fn register_dependent(&self, dependency: &str, dependent: &str) {
        let dependency = self.canonical_name(dependency);
        let mut state = self.state();
        if dependency == dependent || state.ignored.contains(&dependency) {
            return;
        }
        let dependents = state.dependents.entry(dependency.clone()).or_default();
        if !dependents.iter().any(|d| d == dependent) {
            dependents.push(dependent.to_string());
        }
        let dependencies = state.dependencies.entry(dependent.to_string()).or_default();
        if !dependencies.contains(&dependency) {
            dependencies.push(dependency);
        }
    }

    /// Whether `candidate` depends on `name`, directly or transitively.
    fn is_dependent(&self, name: &str, candidate: &str) -> bool {
        let state = self.state();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(current) = queue.pop_front() {
            for dependent in state.dependents.get(&current).into_iter().flatten() {
                if dependent == candidate {
                    return true;
                }
                if seen.insert(dependent.clone()) {
                    queue.push_back(dependent.clone());
                }
            }
        }
        false
    }

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------

    pub fn resolve(&self, name: &str) -> Result<Instance> {
        self.resolve_for(name, None)
    }

    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.resolve(name)?
            .downcast::<T>()
            .ok_or_else(|| ContainerError::NotRequiredType {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    pub(crate) fn resolve_for(&self, name: &str, requester: Option<&str>) -> Result<Instance> {
        let canonical = self.canonical_name(name);
        let (cached, definition) = {
            let state = self.state();
            if let Some(instance) = state.resolvable.get(&canonical) {
                return Ok(instance.clone());
            }
            (
                state.singletons.get(&canonical).cloned(),
                state.definitions.get(&canonical).cloned(),
            )
        };

        if cached.is_some() || definition.is_some() {
            if let Some(requester) = requester {
                self.register_dependent(&canonical, requester);
            }
        }
        if let Some(instance) = cached {
            return Ok(instance);
        }

        let Some(definition) = definition else {
            return match self.parent() {
                Some(parent) => parent.resolve(name),
                None => Err(ContainerError::NoSuchDefinition(name.to_string())),
            };
        };

        match definition.scope {
            Scope::Singleton => self.singleton_or_create(&canonical, &definition),
            Scope::Prototype => self.create(&canonical, &definition).map(|(instance, _)| instance),
        }
    }

    fn singleton_or_create(&self, name: &str, definition: &Definition) -> Result<Instance> {
        let current = thread::current().id();
        {
            let mut state = self.state();
            loop {
                if let Some(instance) = state.singletons.get(name) {
                    return Ok(instance.clone());
                }
                let owner = state.in_creation.get(name).copied();
                match owner {
                    Some(owner) if owner == current => {
                        return Err(ContainerError::CurrentlyInCreation(name.to_string()));
                    }
                    Some(owner) => {
                        if waits_on(&state, owner, current) {
                            warn!(registry = %self.id, component = %name, "Cross-thread creation cycle");
                            return Err(ContainerError::CurrentlyInCreation(name.to_string()));
                        }
                        state.waiting.insert(current, name.to_string());
                        state = self
                            .creation
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner);
                        state.waiting.remove(&current);
                    }
                    None => {
                        state.in_creation.insert(name.to_string(), current);
                        break;
                    }
                }
            }
        }

        debug!(registry = %self.id, component = %name, "Creating singleton");
        let created = self.create(name, definition);

        let mut state = self.state();
        state.in_creation.remove(name);
        self.creation.notify_all();
        let (instance, keep) = created?;
        if keep {
            state.singleton_order.push(name.to_string());
            state.singletons.insert(name.to_string(), instance.clone());
        } else {
            debug!(registry = %self.id, component = %name, "Singleton registration skipped by processor");
        }
        Ok(instance)
    }

    /// Builds one instance. The flag is false when a processor asked for the
    /// instance not to be kept as a singleton.
    fn create(&self, name: &str, definition: &Definition) -> Result<(Instance, bool)> {
        for dependency in &definition.depends_on {
            if self.is_dependent(name, dependency) {
                return Err(ContainerError::init_failed(
                    name,
                    format!("circular depends-on relationship with '{dependency}'"),
                ));
            }
            self.register_dependent(dependency, name);
            self.resolve(dependency)
                .map_err(|e| ContainerError::init_failed(name, e))?;
        }

        let resolver = Resolver::new(self, name);
        let mut instance = self
            .instantiator
            .instantiate(name, definition, &resolver)
            .map_err(|e| ContainerError::from_boxed(name, e))?;

        let processors = self.state().instance_processors.clone();
        for processor in &processors {
            match processor
                .before_init(name, instance)
                .map_err(|e| ContainerError::init_failed(name, e))?
            {
                HookOutcome::Proceed(next) => instance = next,
                HookOutcome::Skip(skipped) => return Ok((skipped, false)),
            }
        }

        if let Some(hook) = &definition.init_hook {
            let callback = instance.hook(hook).ok_or_else(|| {
                ContainerError::init_failed(name, format!("no init hook named '{hook}'"))
            })?;
            callback().map_err(|e| ContainerError::init_failed(name, e))?;
        }

        for processor in &processors {
            match processor
                .after_init(name, instance)
                .map_err(|e| ContainerError::init_failed(name, e))?
            {
                HookOutcome::Proceed(next) => instance = next,
                HookOutcome::Skip(skipped) => return Ok((skipped, false)),
            }
        }
        Ok((instance, true))
    }

    /// Builds every non-lazy singleton definition, in registration order.
    pub fn preinstantiate_singletons(&self) -> Result<()> {
        let names = self.definition_names();
        info!(registry = %self.id, definitions = names.len(), "Pre-instantiating singletons");
        for name in names {
            let Some(definition) = self.definition(&name) else {
                continue;
            };
            if definition.is_singleton() && !definition.lazy {
                self.resolve(&name)?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Destruction
    // -------------------------------------------------------------------------

    /// Destroys every local singleton, dependents before their dependencies.
    /// Failures are logged; the parent registry is never touched.
    pub fn destroy_all(&self) {
        let names = self.singleton_names();
        info!(registry = %self.id, count = names.len(), "Destroying singletons");
        for name in names.iter().rev() {
            self.destroy_singleton(name);
        }
        let mut state = self.state();
        state.singletons.clear();
        state.singleton_order.clear();
        state.dependents.clear();
        state.dependencies.clear();
    }

    pub fn destroy_singleton(&self, name: &str) {
        let (instance, dependents) = {
            let mut state = self.state();
            let instance = state.singletons.remove(name);
            state.singleton_order.retain(|n| n != name);
            let dependents = state.dependents.remove(name).unwrap_or_default();
            (instance, dependents)
        };

        for dependent in dependents {
            self.destroy_singleton(&dependent);
        }
        if let Some(instance) = instance {
            self.run_destroy(name, &instance);
        }

        let mut state = self.state();
        if let Some(dependencies) = state.dependencies.remove(name) {
            for dependency in dependencies {
                if let Some(list) = state.dependents.get_mut(&dependency) {
                    list.retain(|d| d != name);
                }
            }
        }
    }

    fn run_destroy(&self, name: &str, instance: &Instance) {
        debug!(registry = %self.id, component = %name, "Destroying singleton");
        if let Some(disposable) = instance.disposable() {
            if let Err(e) = disposable.destroy() {
                warn!(registry = %self.id, component = %name, error = %e, "Destroy failed");
            }
        }
        let hook = self.definition(name).and_then(|d| d.destroy_hook);
        if let Some(hook) = hook {
            match instance.hook(&hook) {
                Some(callback) => {
                    if let Err(e) = callback() {
                        warn!(registry = %self.id, component = %name, hook = %hook, error = %e, "Destroy hook failed");
                    }
                }
                None => warn!(registry = %self.id, component = %name, hook = %hook, "Destroy hook not found"),
            }
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Registry")
            .field("id", &self.id)
            .field("definitions", &state.definition_order)
            .field("singletons", &state.singleton_order.len())
            .field("frozen", &self.is_frozen())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// Whether following "owner is waiting on a singleton owned by ..." from
/// `owner` leads back to `current`.
fn waits_on(state: &RegistryState, mut owner: ThreadId, current: ThreadId) -> bool {
    for _ in 0..=state.waiting.len() {
        if owner == current {
            return true;
        }
        let next = state
            .waiting
            .get(&owner)
            .and_then(|name| state.in_creation.get(name));
        match next {
            Some(next) => owner = *next,
            None => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Disposable;
    use crate::mock::Journal;

    struct Tracked {
        name: &'static str,
        journal: Journal,
    }

    impl Disposable for Tracked {
        fn destroy(&self) -> std::result::Result<(), crate::error::BoxError> {
            self.journal.record(format!("destroy:{}", self.name));
            Ok(())
        }
    }

    fn tracked(name: &'static str, journal: &Journal) -> Definition {
        let journal = journal.clone();
        Definition::of(move |_| {
            journal.record(format!("create:{name}"));
            let value = Arc::new(Tracked {
                name,
                journal: journal.clone(),
            });
            Ok(Instance::from_arc(value.clone()).with_disposable(value))
        })
    }

    fn registry(id: &str) -> Registry {
        Registry::new(id, Arc::new(SupplierInstantiator))
    }

    #[test]
    fn test_depends_on_orders_creation_and_destruction() {
        let journal = Journal::new();
        let registry = registry("root");
        registry.register("b", tracked("b", &journal).depends_on("a")).unwrap();
        registry.register("a", tracked("a", &journal)).unwrap();

        registry.preinstantiate_singletons().unwrap();
        assert_eq!(journal.entries(), vec!["create:a", "create:b"]);

        journal.clear();
        registry.destroy_all();
        assert_eq!(journal.entries(), vec!["destroy:b", "destroy:a"]);
        assert_eq!(registry.singleton_count(), 0);
    }

    #[test]
    fn test_resolver_lookups_are_tracked_as_dependencies() {
        let journal = Journal::new();
        let registry = registry("root");
        registry.register("store", tracked("store", &journal)).unwrap();
        let j = journal.clone();
        registry
            .register(
                "service",
                Definition::of(move |r| {
                    r.get("store")?;
                    let value = Arc::new(Tracked { name: "service", journal: j.clone() });
                    Ok(Instance::from_arc(value.clone()).with_disposable(value))
                }),
            )
            .unwrap();

        registry.resolve("service").unwrap();
        assert_eq!(registry.dependencies_of("service"), vec!["store".to_string()]);
        assert_eq!(registry.dependents_of("store"), vec!["service".to_string()]);

        registry.destroy_all();
        assert_eq!(journal.entries(), vec!["create:store", "destroy:service", "destroy:store"]);
    }

    #[test]
    fn test_parent_delegation_is_local_first() {
        let parent = Arc::new(registry("parent"));
        parent.register("x", Definition::of(|_| Ok(Instance::new("parent-x")))).unwrap();
        parent.register("y", Definition::of(|_| Ok(Instance::new("parent-y")))).unwrap();

        let child = registry("child").with_parent(&parent);
        child.register("y", Definition::of(|_| Ok(Instance::new("child-y")))).unwrap();

        assert_eq!(*child.get_as::<&str>("x").unwrap(), "parent-x");
        assert_eq!(*child.get_as::<&str>("y").unwrap(), "child-y");
        assert!(matches!(
            child.resolve("z"),
            Err(ContainerError::NoSuchDefinition(name)) if name == "z"
        ));
        assert!(child.contains("x"));
        assert!(!child.contains_local("x"));
    }

    #[test]
    fn test_removed_definition_keeps_built_singleton() {
        let parent = Arc::new(registry("parent"));
        parent.register("x", Definition::of(|_| Ok(Instance::new(5u32)))).unwrap();
        let child = registry("child").with_parent(&parent);

        let first = child.resolve("x").unwrap();
        parent.remove_definition("x").unwrap();

        assert_eq!(*first.downcast::<u32>().unwrap(), 5);
        assert!(child.resolve("x").unwrap().same_as(&first));
    }

    #[test]
    fn test_frozen_registry_rejects_registration() {
        let registry = registry("root");
        registry.freeze();
        assert!(matches!(
            registry.register("late", Definition::singleton()),
            Err(ContainerError::DuplicateDefinition { .. })
        ));
    }

    #[test]
    fn test_frozen_registry_rejects_removal() {
        let registry = registry("root");
        registry.register("a", Definition::singleton()).unwrap();
        registry.freeze();
        assert!(matches!(
            registry.remove_definition("a"),
            Err(ContainerError::DuplicateDefinition { .. })
        ));
        assert_eq!(registry.definition_count(), 1);
    }

    #[test]
    fn test_overriding_can_be_disabled() {
        let registry = registry("root").allow_overriding(false);
        registry.register("a", Definition::singleton()).unwrap();
        assert!(matches!(
            registry.register("a", Definition::singleton()),
            Err(ContainerError::DuplicateDefinition { .. })
        ));
    }

    #[test]
    fn test_aliases_resolve_to_the_same_singleton() {
        let registry = registry("root");
        registry.register("primary", Definition::of(|_| Ok(Instance::new(1u8)))).unwrap();
        registry.register_alias("primary", "secondary").unwrap();

        let a = registry.resolve("primary").unwrap();
        let b = registry.resolve("secondary").unwrap();
        assert!(a.same_as(&b));
    }

    #[test]
    fn test_prototypes_are_not_cached() {
        let registry = registry("root");
        registry
            .register("proto", Definition::prototype().supplier(|_| Ok(Instance::new(0u8))))
            .unwrap();
        let a = registry.resolve("proto").unwrap();
        let b = registry.resolve("proto").unwrap();
        assert!(!a.same_as(&b));
        assert_eq!(registry.singleton_count(), 0);
    }

    #[test]
    fn test_circular_references_fail() {
        let registry = registry("root");
        registry
            .register("a", Definition::of(|r| {
                r.get("b")?;
                Ok(Instance::new(()))
            }))
            .unwrap();
        registry
            .register("b", Definition::of(|r| {
                r.get("a")?;
                Ok(Instance::new(()))
            }))
            .unwrap();
        assert!(matches!(
            registry.resolve("a"),
            Err(ContainerError::CurrentlyInCreation(name)) if name == "a"
        ));
    }

    #[test]
    fn test_circular_depends_on_fails() {
        let registry = registry("root");
        registry.register("a", Definition::singleton().depends_on("b").supplier(|_| Ok(Instance::new(())))).unwrap();
        registry.register("b", Definition::singleton().depends_on("a").supplier(|_| Ok(Instance::new(())))).unwrap();
        assert!(registry.resolve("a").is_err());
    }

    #[test]
    fn test_named_hooks_run() {
        let journal = Journal::new();
        let registry = registry("root");
        let (j1, j2) = (journal.clone(), journal.clone());
        registry
            .register(
                "pool",
                Definition::singleton()
                    .init_hook("open")
                    .destroy_hook("close")
                    .supplier(move |_| {
                        let (open, close) = (j1.clone(), j2.clone());
                        Ok(Instance::new(())
                            .with_hook("open", move || {
                                open.record("open");
                                Ok(())
                            })
                            .with_hook("close", move || {
                                close.record("close");
                                Ok(())
                            }))
                    }),
            )
            .unwrap();

        registry.resolve("pool").unwrap();
        registry.destroy_all();
        assert_eq!(journal.entries(), vec!["open", "close"]);
    }

    #[test]
    fn test_missing_init_hook_fails() {
        let registry = registry("root");
        registry
            .register("broken", Definition::of(|_| Ok(Instance::new(()))).init_hook("start"))
            .unwrap();
        assert!(matches!(
            registry.resolve("broken"),
            Err(ContainerError::InitializationFailed { name, .. }) if name == "broken"
        ));
    }

    #[test]
    fn test_resolvable_dependencies_are_not_destroyed() {
        let registry = registry("root");
        registry.register_resolvable_dependency("self", Instance::new("me"));
        assert!(registry.resolve("self").is_ok());
        assert_eq!(registry.singleton_count(), 0);
    }

    #[test]
    fn test_cross_thread_cycle_fails_instead_of_waiting() {
        use std::sync::atomic::AtomicBool;
        use std::sync::{mpsc, Barrier};
        use std::time::Duration;

        let registry = Arc::new(registry("root"));
        let barrier = Arc::new(Barrier::new(2));
        for (name, other) in [("a", "b"), ("b", "a")] {
            let (barrier, first) = (barrier.clone(), Arc::new(AtomicBool::new(true)));
            registry
                .register(
                    name,
                    Definition::of(move |r| {
                        // Both threads hold their own singleton before asking for the other.
                        if first.swap(false, Ordering::SeqCst) {
                            barrier.wait();
                        }
                        r.get(other)?;
                        Ok(Instance::new(()))
                    }),
                )
                .unwrap();
        }

        let (tx, rx) = mpsc::channel();
        for name in ["a", "b"] {
            let (registry, tx) = (registry.clone(), tx.clone());
            thread::spawn(move || {
                let _ = tx.send(registry.resolve(name).is_err());
            });
        }
        for _ in 0..2 {
            let failed = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("creation cycle across threads must not block");
            assert!(failed);
        }
        assert_eq!(registry.singleton_count(), 0);
    }
}
