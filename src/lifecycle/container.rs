//! # Container State Machine
//!
//! A [`Container`] moves through `New → Refreshing → Active → Closing → Closed`.
//! [`Container::refresh`] runs the whole boot sequence and either ends `Active`
//! or rolls everything back and returns to `New`; [`Container::close`] tears an
//! active container down exactly once.
//!
//! ## Boot sequence
//!
//! 1. Run initializers, validate required properties, start buffering events.
//! 2. Create the registry (linked to the parent's) and load definitions.
//! 3. Register the `environment` singleton and the `containerId` self reference.
//! 4. Run registry processors to a fixed point.
//! 5. Install instance processors.
//! 6. Set up the message source.
//! 7. Invoke the refresh hook.
//! 8. Register listeners and replay early events.
//! 9. Freeze the registry, build eager singletons, fire post-instance callbacks.
//! 10. Start auto-start lifecycle components.
//! 11. Publish `context.refreshed`.
//!
//! Boot and close are serialized per container through an async mutex. The
//! bookkeeping lock is never held across an await.

use super::config::ContainerConfig;
use super::message::{DelegatingMessageSource, MessageSource, MESSAGE_SOURCE_NAME};
use crate::error::{ContainerError, InactiveReason, Result};
use crate::events::EventBus;
use crate::model::{Environment, Event, EventType, Instance, Role};
use crate::phase::PhaseController;
use crate::pipeline;
use crate::registry::Registry;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Registry name of the container's [`Environment`].
pub const ENVIRONMENT_NAME: &str = "environment";
/// Registry name resolving to the container id.
pub const CONTAINER_ID_NAME: &str = "containerId";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    New,
    Refreshing,
    Active,
    Closing,
    Closed,
}

struct Inner {
    state: ContainerState,
    registry: Option<Arc<Registry>>,
    controller: Option<Arc<PhaseController>>,
    message_source: Option<Arc<dyn MessageSource>>,
    environment: Environment,
    startup: Option<SystemTime>,
}

pub struct Container {
    id: String,
    parent: Option<Weak<Container>>,
    config: ContainerConfig,
    inner: Mutex<Inner>,
    events: EventBus,
    monitor: tokio::sync::Mutex<()>,
}

impl Container {
    pub fn new(config: ContainerConfig) -> Arc<Self> {
        Arc::new(Self::build(config, None))
    }

    /// A child container. Lookups that miss locally go to `parent`; events
    /// published here are re-published there. The child never closes its
    /// parent.
    pub fn with_parent(config: ContainerConfig, parent: &Arc<Container>) -> Arc<Self> {
        Arc::new(Self::build(config, Some(Arc::downgrade(parent))))
    }

    fn build(config: ContainerConfig, parent: Option<Weak<Container>>) -> Self {
        Self {
            id: config.id.clone(),
            parent,
            inner: Mutex::new(Inner {
                state: ContainerState::New,
                registry: None,
                controller: None,
                message_source: None,
                environment: config.environment.clone(),
                startup: None,
            }),
            events: EventBus::new(config.settings.listener_fail_fast),
            monitor: tokio::sync::Mutex::new(()),
            config,
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn illegal(&self, reason: InactiveReason) -> ContainerError {
        ContainerError::IllegalState {
            id: self.id.clone(),
            reason,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<Arc<Container>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn state(&self) -> ContainerState {
        self.inner().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == ContainerState::Active
    }

    /// When the last successful or in-progress boot began.
    pub fn startup_time(&self) -> Option<SystemTime> {
        self.inner().startup
    }

    pub fn environment(&self) -> Environment {
        self.inner().environment.clone()
    }

    // -------------------------------------------------------------------------
    // Boot
    // -------------------------------------------------------------------------

    /// Boots the container. On failure every step already taken is undone,
    /// the container is back in `New` and the original error is returned.
    #[tracing::instrument(skip(self), fields(container = %self.id))]
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.monitor.lock().await;
        {
            let mut inner = self.inner();
            match inner.state {
                ContainerState::New => {}
                ContainerState::Refreshing | ContainerState::Active => {
                    return Err(self.illegal(InactiveReason::AlreadyActive));
                }
                ContainerState::Closing | ContainerState::Closed => {
                    return Err(self.illegal(InactiveReason::AlreadyClosed));
                }
            }
            inner.state = ContainerState::Refreshing;
            inner.startup = Some(SystemTime::now());
        }
        info!("Refreshing container");

        match self.boot().await {
            Ok(()) => {
                let singletons = self.registry().map(|r| r.singleton_count()).unwrap_or_default();
                info!(singletons, "Container refreshed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed, rolling back");
                self.cancel_refresh().await;
                Err(e)
            }
        }
    }

    async fn boot(&self) -> Result<()> {
        let settings = &self.config.settings;

        // 1. environment
        let mut environment = self.config.environment.clone();
        for initializer in &self.config.initializers {
            initializer
                .initialize(&mut environment)
                .map_err(|e| ContainerError::init_failed("container initializer", e))?;
        }
        environment.validate_required()?;
        self.inner().environment = environment.clone();
        self.events.begin_buffering();

        // 2. registry
        let mut registry = Registry::new(self.id.clone(), self.config.instantiator.clone())
            .allow_overriding(settings.allow_definition_overriding);
        if let Some(parent_registry) = self.parent().and_then(|p| p.active_registry()) {
            registry = registry.with_parent(&parent_registry);
        }
        let registry = Arc::new(registry);
        self.inner().registry = Some(registry.clone());
        self.config
            .loader
            .load(&registry)
            .map_err(|e| ContainerError::from_boxed("definition loader", e))?;
        debug!(definitions = registry.definition_count(), "Definitions loaded");

        // 3. self references
        registry.register_singleton(ENVIRONMENT_NAME, Instance::new(environment))?;
        registry.register_resolvable_dependency(CONTAINER_ID_NAME, Instance::new(self.id.clone()));
        registry.ignore_dependency(ENVIRONMENT_NAME);
        registry.ignore_dependency(CONTAINER_ID_NAME);

        // 4-5. extension pipeline
        pipeline::invoke_registry_processors(
            &registry,
            &self.config.registry_processors,
            settings.max_pipeline_iterations,
        )?;
        pipeline::register_instance_processors(&registry, &self.config.instance_processors)?;

        // 6. messages
        let message_source = self.init_message_source(&registry)?;
        self.inner().message_source = Some(message_source);

        // 7. refresh hook
        if let Some(hook) = &self.config.refresh_hook {
            hook.on_refresh(&registry)
                .map_err(|e| ContainerError::init_failed("refresh hook", e))?;
        }

        // 8. listeners, early events
        for listener in &self.config.listeners {
            self.events.add_listener(listener.clone());
        }
        for (name, order) in registry.names_for_role(Role::Listener) {
            self.events.add_named(name, order);
        }
        let early = self.events.take_early();
        debug!(listeners = self.events.listener_count(), early = early.len(), "Event bus ready");
        for event in &early {
            self.events.multicast(event, registry.as_ref())?;
        }

        // 9. eager singletons
        registry.freeze();
        registry.preinstantiate_singletons()?;
        pipeline::notify_singletons_ready(&registry)?;
        self.register_built_listeners(&registry);

        // 10. phased start
        let controller = Arc::new(PhaseController::from_registry(&registry, settings));
        self.inner().controller = Some(controller.clone());
        controller.on_boot().await?;

        // 11. done
        self.publish_event(Event::container(EventType::REFRESHED, self.id.clone()))?;
        self.inner().state = ContainerState::Active;
        Ok(())
    }

    /// Singletons that expose a listener without carrying the listener role
    /// join the bus once they exist.
    fn register_built_listeners(&self, registry: &Registry) {
        for (name, instance) in registry.singletons() {
            let Some(listener) = instance.listener() else {
                continue;
            };
            if self.events.contains(&name, listener) {
                continue;
            }
            let order = listener.order();
            debug!(listener = %name, "Registering listener discovered on built singleton");
            self.events.add_named(name, order);
        }
    }

    fn init_message_source(&self, registry: &Registry) -> Result<Arc<dyn MessageSource>> {
        let parent = self.parent().and_then(|p| p.message_source());
        if registry.contains_local(MESSAGE_SOURCE_NAME) {
            let local = registry
                .resolve(MESSAGE_SOURCE_NAME)?
                .message_source()
                .cloned()
                .ok_or_else(|| ContainerError::NotRequiredType {
                    name: MESSAGE_SOURCE_NAME.to_string(),
                    expected: "MessageSource",
                })?;
            return Ok(match parent {
                Some(parent) => Arc::new(DelegatingMessageSource::new(Some(local), Some(parent))),
                None => local,
            });
        }

        debug!("No local message source, delegating to parent");
        let source = Arc::new(DelegatingMessageSource::new(None, parent));
        registry.register_singleton(
            MESSAGE_SOURCE_NAME,
            Instance::from_arc(source.clone()).with_message_source(source.clone()),
        )?;
        Ok(source)
    }

    async fn cancel_refresh(&self) {
        let (registry, controller) = {
            let mut inner = self.inner();
            (inner.registry.take(), inner.controller.take())
        };
        if let Some(controller) = controller {
            controller.stop_all().await;
        }
        if let Some(registry) = registry {
            registry.destroy_all();
        }
        self.events.reset();

        let mut inner = self.inner();
        inner.message_source = None;
        inner.startup = None;
        inner.environment = self.config.environment.clone();
        inner.state = ContainerState::New;
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Closes an active container. Any other state makes this a no-op, so
    /// repeated or concurrent calls tear down exactly once.
    #[tracing::instrument(skip(self), fields(container = %self.id))]
    pub async fn close(&self) {
        let _guard = self.monitor.lock().await;
        {
            let mut inner = self.inner();
            if inner.state != ContainerState::Active {
                debug!(state = ?inner.state, "Close skipped");
                return;
            }
            inner.state = ContainerState::Closing;
        }
        info!("Closing container");

        if let Err(e) = self.publish_event(Event::container(EventType::CLOSED, self.id.clone())) {
            warn!(error = %e, "Listener failed on close");
        }

        let controller = self.inner().controller.take();
        if let Some(controller) = controller {
            controller.on_shutdown().await;
        }

        let registry = self.inner().registry.take();
        if let Some(registry) = registry {
            registry.destroy_all();
        }
        if let Some(hook) = &self.config.refresh_hook {
            hook.on_close();
        }
        self.events.reset();

        {
            let mut inner = self.inner();
            inner.message_source = None;
            inner.state = ContainerState::Closed;
        }
        info!("Container closed");
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Delivers `event` to local listeners (or buffers it during early boot),
    /// then re-publishes it to the parent.
    pub fn publish_event(&self, event: Event) -> Result<()> {
        let registry = {
            let inner = self.inner();
            match inner.state {
                ContainerState::New => return Err(self.illegal(InactiveReason::NotBooted)),
                ContainerState::Closed => return Err(self.illegal(InactiveReason::AlreadyClosed)),
                _ => inner.registry.clone(),
            }
        };
        debug!(container = %self.id, event_type = %event.event_type(), "Publishing event");

        let local = if self.events.try_buffer(&event) {
            Ok(())
        } else {
            match &registry {
                Some(registry) => self.events.multicast(&event, registry.as_ref()),
                None => Ok(()),
            }
        };

        if let Some(parent) = self.parent() {
            match parent.publish_event(event) {
                Ok(()) => {}
                Err(ContainerError::IllegalState { reason, .. }) => {
                    debug!(container = %self.id, %reason, "Parent inactive, event not propagated");
                }
                Err(e) => return local.and(Err(e)),
            }
        }
        local
    }

    /// Publishes an arbitrary value as a payload event.
    pub fn publish<T: Any + Send + Sync>(&self, payload: T) -> Result<()> {
        self.publish_event(Event::payload(self.id.clone(), payload))
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    fn active_registry(&self) -> Option<Arc<Registry>> {
        self.registry().ok()
    }

    /// The live registry. Available while refreshing, active or closing.
    pub fn registry(&self) -> Result<Arc<Registry>> {
        let inner = self.inner();
        match inner.state {
            ContainerState::New => Err(self.illegal(InactiveReason::NotBooted)),
            ContainerState::Closed => Err(self.illegal(InactiveReason::AlreadyClosed)),
            ContainerState::Closing => inner
                .registry
                .clone()
                .ok_or_else(|| self.illegal(InactiveReason::AlreadyClosed)),
            ContainerState::Refreshing | ContainerState::Active => inner
                .registry
                .clone()
                .ok_or_else(|| self.illegal(InactiveReason::NotBooted)),
        }
    }

    pub fn get_bean(&self, name: &str) -> Result<Instance> {
        self.registry()?.resolve(name)
    }

    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.registry()?.get_as::<T>(name)
    }

    pub fn contains_bean(&self, name: &str) -> bool {
        self.registry().is_ok_and(|r| r.contains(name))
    }

    fn message_source(&self) -> Option<Arc<dyn MessageSource>> {
        self.inner().message_source.clone()
    }

    pub fn get_message(&self, code: &str, args: &[&str]) -> Option<String> {
        self.message_source()?.message(code, args)
    }

    // -------------------------------------------------------------------------
    // Explicit start/stop
    // -------------------------------------------------------------------------

    fn controller(&self) -> Result<Arc<PhaseController>> {
        let inner = self.inner();
        match (inner.state, inner.controller.clone()) {
            (ContainerState::Active, Some(controller)) => Ok(controller),
            (ContainerState::Closing | ContainerState::Closed, _) => {
                Err(self.illegal(InactiveReason::AlreadyClosed))
            }
            _ => Err(self.illegal(InactiveReason::NotBooted)),
        }
    }

    /// Starts every lifecycle component, including manual ones, then publishes
    /// `context.started`.
    pub async fn start(&self) -> Result<()> {
        self.controller()?.start_all().await?;
        self.publish_event(Event::container(EventType::STARTED, self.id.clone()))
    }

    /// Stops every running lifecycle component, then publishes
    /// `context.stopped`. The container stays active.
    pub async fn stop(&self) -> Result<()> {
        self.controller()?.stop_all().await;
        self.publish_event(Event::container(EventType::STOPPED, self.id.clone()))
    }

    pub fn is_running(&self) -> bool {
        self.controller().is_ok_and(|c| c.is_running())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner();
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{ContainerInitializer, StaticMessageSource};
    use crate::mock::{Journal, MockComponent, RecordingListener};
    use crate::model::{Definition, PropertySource};
    use crate::registry::DefinitionSet;

    fn config(id: &str, definitions: DefinitionSet) -> ContainerConfig {
        ContainerConfig::new(id).with_definitions(definitions)
    }

    #[tokio::test]
    async fn test_refresh_then_close() {
        let journal = Journal::new();
        let container = Container::new(
            config(
                "app",
                DefinitionSet::new().with("worker", MockComponent::new("worker", &journal).definition()),
            )
            .with_listener(Arc::new(RecordingListener::new("audit", &journal))),
        );

        container.refresh().await.unwrap();
        assert!(container.is_active());
        assert!(container.is_running());
        assert!(container.startup_time().is_some());

        container.close().await;
        assert_eq!(container.state(), ContainerState::Closed);
        assert_eq!(
            journal.entries(),
            vec![
                "start:worker",
                "audit:context.refreshed",
                "audit:context.closed",
                "stop:worker",
                "destroy:worker",
            ]
        );
    }

    #[tokio::test]
    async fn test_reads_distinguish_inactive_states() {
        let container = Container::new(ContainerConfig::new("app"));
        assert!(matches!(
            container.get_bean("x"),
            Err(ContainerError::IllegalState { reason: InactiveReason::NotBooted, .. })
        ));

        container.refresh().await.unwrap();
        assert!(matches!(
            container.refresh().await,
            Err(ContainerError::IllegalState { reason: InactiveReason::AlreadyActive, .. })
        ));

        container.close().await;
        assert!(matches!(
            container.get_bean("x"),
            Err(ContainerError::IllegalState { reason: InactiveReason::AlreadyClosed, .. })
        ));
        assert!(matches!(
            container.publish_event(Event::container("app", "x")),
            Err(ContainerError::IllegalState { reason: InactiveReason::AlreadyClosed, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_required_property_aborts_boot() {
        let container = Container::new(
            ContainerConfig::new("app").with_environment(Environment::new().with_required("db.url")),
        );
        assert!(matches!(
            container.refresh().await,
            Err(ContainerError::MissingRequiredProperty(keys)) if keys == vec!["db.url".to_string()]
        ));
        assert_eq!(container.state(), ContainerState::New);
    }

    struct InjectUrl;

    impl ContainerInitializer for InjectUrl {
        fn initialize(&self, environment: &mut Environment) -> std::result::Result<(), crate::error::BoxError> {
            environment.add_first(PropertySource::new("init").with("db.url", "mem://"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_initializer_runs_before_validation() {
        let container = Container::new(
            ContainerConfig::new("app")
                .with_environment(Environment::new().with_required("db.url"))
                .with_initializer(Arc::new(InjectUrl)),
        );
        container.refresh().await.unwrap();

        let environment = container.get_as::<Environment>(ENVIRONMENT_NAME).unwrap();
        assert_eq!(environment.property("db.url"), Some("mem://"));
        assert_eq!(*container.get_as::<String>(CONTAINER_ID_NAME).unwrap(), "app");
    }

    #[tokio::test]
    async fn test_messages_fall_back_to_parent() {
        let parent = Container::new(config(
            "parent",
            DefinitionSet::new().with(
                MESSAGE_SOURCE_NAME,
                Definition::of(|_| {
                    let source = Arc::new(StaticMessageSource::new().with("hi", "hello {0}"));
                    Ok(Instance::from_arc(source.clone()).with_message_source(source))
                }),
            ),
        ));
        parent.refresh().await.unwrap();

        let child = Container::with_parent(ContainerConfig::new("child"), &parent);
        child.refresh().await.unwrap();

        assert_eq!(child.get_message("hi", &["there"]).as_deref(), Some("hello there"));
        assert!(child.get_message("missing", &[]).is_none());
    }

    #[tokio::test]
    async fn test_explicit_start_and_stop() {
        let journal = Journal::new();
        let container = Container::new(
            config(
                "app",
                DefinitionSet::new().with("manual", MockComponent::new("manual", &journal).manual().definition()),
            )
            .with_listener(Arc::new(RecordingListener::new("audit", &journal))),
        );
        container.refresh().await.unwrap();
        assert!(!container.is_running());

        container.start().await.unwrap();
        assert!(container.is_running());
        container.stop().await.unwrap();
        assert!(!container.is_running());
        assert!(container.is_active());

        assert_eq!(
            journal.entries(),
            vec![
                "audit:context.refreshed",
                "start:manual",
                "audit:context.started",
                "stop:manual",
                "audit:context.stopped",
            ]
        );
    }
}
