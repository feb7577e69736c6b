//! # Event Bus
//!
//! Synchronous multicast of [`Event`]s to registered listeners.
//!
//! Until the owning container has its listeners in place, published events are
//! buffered. [`EventBus::take_early`] hands the buffer back exactly once and
//! switches the bus to live delivery; a buffered event is never delivered twice.
//!
//! Listener order is fixed at registration: each listener is inserted after
//! every listener with a lower or equal [`Order`], so ties keep registration
//! order.
//!
//! Every matching listener sees the event even when an earlier one failed. The
//! first failure is returned as [`ContainerError::ListenerFailed`] and the rest
//! are logged, unless the bus is fail-fast, in which case delivery stops at the
//! first failure.

pub mod listener;

pub use listener::*;

use crate::error::{BoxError, ContainerError, Result};
use crate::model::Event;
use crate::pipeline::{insertion_index, Order};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, warn};

#[derive(Clone)]
enum ListenerEntry {
    Static {
        listener: Arc<dyn EventListener>,
        order: Order,
    },
    /// Registry entry resolved at delivery time.
    Named { name: String, order: Order },
}

impl ListenerEntry {
    fn order(&self) -> Order {
        match self {
            ListenerEntry::Static { order, .. } | ListenerEntry::Named { order, .. } => *order,
        }
    }

    fn label(&self) -> &str {
        match self {
            ListenerEntry::Static { .. } => "<static>",
            ListenerEntry::Named { name, .. } => name,
        }
    }
}

pub struct EventBus {
    listeners: RwLock<Vec<ListenerEntry>>,
    early: Mutex<Option<Vec<Event>>>,
    fail_fast: bool,
}

impl EventBus {
    pub fn new(fail_fast: bool) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            early: Mutex::new(None),
            fail_fast,
        }
    }

    /// Starts collecting events instead of delivering them.
    pub fn begin_buffering(&self) {
        *self.early.lock().unwrap_or_else(PoisonError::into_inner) = Some(Vec::new());
    }

    /// Buffers `event` if the bus is not live yet. Returns whether it did.
    pub fn try_buffer(&self, event: &Event) -> bool {
        let mut early = self.early.lock().unwrap_or_else(PoisonError::into_inner);
        match early.as_mut() {
            Some(buffer) => {
                debug!(event_type = %event.event_type(), buffered = buffer.len() + 1, "Buffering early event");
                buffer.push(event.clone());
                true
            }
            None => false,
        }
    }

    /// Takes the early buffer and switches to live delivery.
    pub fn take_early(&self) -> Vec<Event> {
        self.early
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default()
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        let order = listener.order();
        self.insert(ListenerEntry::Static { listener, order });
    }

    pub fn add_named(&self, name: impl Into<String>, order: Order) {
        self.insert(ListenerEntry::Named {
            name: name.into(),
            order,
        });
    }

    /// Whether `listener` is registered, either as the named entry `name` or
    /// as the same static listener.
    pub fn contains(&self, name: &str, listener: &Arc<dyn EventListener>) -> bool {
        let target = Arc::as_ptr(listener) as *const ();
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|entry| match entry {
                ListenerEntry::Named { name: n, .. } => n == name,
                ListenerEntry::Static { listener, .. } => Arc::as_ptr(listener) as *const () == target,
            })
    }

    fn insert(&self, entry: ListenerEntry) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let index = insertion_index(listeners.as_slice(), entry.order(), ListenerEntry::order);
        listeners.insert(index, entry);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `event` to every interested listener, in order.
    pub fn multicast(&self, event: &Event, resolver: &dyn ListenerResolver) -> Result<()> {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut first: Option<BoxError> = None;
        let mut suppressed = 0usize;

        for entry in &listeners {
            let outcome = match entry {
                ListenerEntry::Static { listener, .. } => deliver(listener.as_ref(), event),
                ListenerEntry::Named { name, .. } => match resolver.resolve_listener(name) {
                    Ok(listener) => deliver(listener.as_ref(), event),
                    Err(e) => Err(Box::new(e) as BoxError),
                },
            };
            let Err(e) = outcome else {
                continue;
            };
            if first.is_none() {
                first = Some(e);
                if self.fail_fast {
                    break;
                }
            } else {
                warn!(listener = entry.label(), event_type = %event.event_type(), error = %e, "Listener failed");
                suppressed += 1;
            }
        }

        match first {
            Some(source) => Err(ContainerError::ListenerFailed {
                event_type: event.event_type().to_string(),
                suppressed,
                source,
            }),
            None => Ok(()),
        }
    }

    /// Drops all listeners and any buffered events.
    pub fn reset(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.early.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn deliver(listener: &dyn EventListener, event: &Event) -> std::result::Result<(), BoxError> {
    if event.event_type().is_assignable_to(&listener.interest()) {
        listener.on_event(event)
    } else {
        Ok(())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(false)
    }
}
