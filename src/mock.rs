//! # Test Doubles
//!
//! Recording components for exercising the container without real services.
//!
//! - [`Journal`] collects `"action:name"` entries in the order they happened.
//! - [`MockComponent`] is a phased lifecycle component that records its start,
//!   stop and destroy calls.
//! - [`RecordingListener`] records every event it receives.
//! - [`MockLoader`] counts how often definitions were loaded and can fail.
//! - [`MockInstantiator`] returns scripted instances through an expectation
//!   builder and checks that every expectation was consumed.
//!
//! # Example
//! ```rust
//! use container_lifecycle::mock::{MockInstantiator, Journal};
//! use container_lifecycle::model::Instance;
//!
//! let mock = MockInstantiator::new();
//! mock.expect_create("cache").return_ok(Instance::new(0u8));
//! mock.expect_create("db").return_err("connection refused");
//! // hand `mock` to a ContainerConfig, boot, then:
//! // mock.verify();
//! ```

use crate::error::BoxError;
use crate::events::EventListener;
use crate::model::{Definition, Disposable, Event, EventType, Instance};
use crate::phase::{Lifecycle, StopHandle};
use crate::pipeline::Order;
use crate::registry::{DefinitionLoader, DefinitionSet, Instantiator, Registry, Resolver};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// JOURNAL
// =============================================================================

/// Shared, ordered record of what happened.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Index of the first occurrence of `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().unwrap().iter().position(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().unwrap().iter().filter(|e| *e == entry).count()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

// =============================================================================
// LIFECYCLE COMPONENT
// =============================================================================

pub struct MockComponent {
    name: String,
    phase: i32,
    auto_startup: bool,
    fail_start: bool,
    stop_delay: Option<Duration>,
    running: Arc<AtomicBool>,
    journal: Journal,
}

impl MockComponent {
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            phase: 0,
            auto_startup: true,
            fail_start: false,
            stop_delay: None,
            running: Arc::new(AtomicBool::new(false)),
            journal: journal.clone(),
        }
    }

    pub fn phase(mut self, phase: i32) -> Self {
        self.phase = phase;
        self
    }

    /// Only starts through an explicit `start_all`.
    pub fn manual(mut self) -> Self {
        self.auto_startup = false;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Stop completes on a background task after `delay`.
    pub fn async_stop(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_instance(self) -> Instance {
        let component = Arc::new(self);
        Instance::from_arc(component.clone())
            .with_lifecycle(component.clone())
            .with_disposable(component)
    }

    /// A singleton definition that always yields this component.
    pub fn definition(self) -> Definition {
        let instance = self.into_instance();
        Definition::of(move |_| Ok(instance.clone()))
    }
}

#[async_trait]
impl Lifecycle for MockComponent {
    async fn start(&self) -> Result<(), BoxError> {
        self.journal.record(format!("start:{}", self.name));
        if self.fail_start {
            return Err(format!("{} refused to start", self.name).into());
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        self.running.store(false, Ordering::SeqCst);
        self.journal.record(format!("stop:{}", self.name));
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn phase(&self) -> i32 {
        self.phase
    }

    fn is_auto_startup(&self) -> bool {
        self.auto_startup
    }

    async fn request_stop(&self) -> Result<StopHandle, BoxError> {
        let Some(delay) = self.stop_delay else {
            self.stop().await?;
            return Ok(StopHandle::completed());
        };
        let (signal, handle) = StopHandle::pair();
        let (running, journal, name) = (self.running.clone(), self.journal.clone(), self.name.clone());
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            running.store(false, Ordering::SeqCst);
            journal.record(format!("stop:{name}"));
            signal.complete();
        });
        Ok(handle)
    }
}

impl Disposable for MockComponent {
    fn destroy(&self) -> Result<(), BoxError> {
        self.journal.record(format!("destroy:{}", self.name));
        Ok(())
    }
}

// =============================================================================
// LISTENER
// =============================================================================

/// Records `"name:event.type"` for every event it accepts.
pub struct RecordingListener {
    name: String,
    interest: EventType,
    order: Order,
    fail: bool,
    journal: Journal,
}

impl RecordingListener {
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            interest: EventType::any(),
            order: Order::Unordered,
            fail: false,
            journal: journal.clone(),
        }
    }

    pub fn interest(mut self, interest: EventType) -> Self {
        self.interest = interest;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Records the event, then fails.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn into_instance(self) -> Instance {
        let listener = Arc::new(self);
        Instance::from_arc(listener.clone()).with_listener(listener)
    }
}

impl EventListener for RecordingListener {
    fn interest(&self) -> EventType {
        self.interest.clone()
    }

    fn order(&self) -> Order {
        self.order
    }

    fn on_event(&self, event: &Event) -> Result<(), BoxError> {
        self.journal.record(format!("{}:{}", self.name, event.event_type()));
        if self.fail {
            return Err(format!("{} rejected {}", self.name, event.event_type()).into());
        }
        Ok(())
    }
}

// =============================================================================
// LOADER
// =============================================================================

/// Loads a fixed [`DefinitionSet`] and counts the calls.
#[derive(Default)]
pub struct MockLoader {
    definitions: DefinitionSet,
    failure: Option<String>,
    loads: AtomicUsize,
}

impl MockLoader {
    pub fn new(definitions: DefinitionSet) -> Self {
        Self {
            definitions,
            ..Self::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DefinitionLoader for MockLoader {
    fn load(&self, registry: &Registry) -> Result<(), BoxError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(message.clone().into());
        }
        self.definitions.load(registry)
    }
}

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

struct Expectation {
    name: String,
    response: Result<Instance, String>,
}

/// An [`Instantiator`] that answers from scripted expectations, in order.
///
/// Panics on an instantiation nobody expected; [`verify`](Self::verify)
/// panics if expectations remain.
#[derive(Clone, Default)]
pub struct MockInstantiator {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl MockInstantiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects the next instantiation to be `name`.
    pub fn expect_create(&self, name: impl Into<String>) -> CreateExpectationBuilder {
        CreateExpectationBuilder {
            name: name.into(),
            expectations: self.expectations.clone(),
        }
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let exps = self.expectations.lock().unwrap();
        if !exps.is_empty() {
            let names: Vec<_> = exps.iter().map(|e| e.name.as_str()).collect();
            panic!("Not all expectations were met. {} remaining: {:?}", exps.len(), names);
        }
    }
}

impl Instantiator for MockInstantiator {
    fn instantiate(
        &self,
        name: &str,
        _definition: &Definition,
        _resolver: &Resolver<'_>,
    ) -> Result<Instance, BoxError> {
        let next = self.expectations.lock().unwrap().pop_front();
        match next {
            Some(expectation) if expectation.name == name => {
                expectation.response.map_err(BoxError::from)
            }
            Some(expectation) => panic!(
                "Unexpected instantiation of '{name}', expected '{}'",
                expectation.name
            ),
            None => panic!("Unexpected instantiation of '{name}', no expectations left"),
        }
    }
}

/// Builder for `create` expectations.
pub struct CreateExpectationBuilder {
    name: String,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl CreateExpectationBuilder {
    pub fn return_ok(self, instance: Instance) {
        self.expectations.lock().unwrap().push_back(Expectation {
            name: self.name,
            response: Ok(instance),
        });
    }

    pub fn return_err(self, message: impl Into<String>) {
        self.expectations.lock().unwrap().push_back(Expectation {
            name: self.name,
            response: Err(message.into()),
        });
    }
}
