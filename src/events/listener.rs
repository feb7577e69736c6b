use crate::error::{BoxError, ContainerError, Result};
use crate::model::{Event, EventType};
use crate::pipeline::Order;
use crate::registry::Registry;
use std::sync::Arc;

/// Receives events whose type is assignable to [`interest`](Self::interest).
pub trait EventListener: Send + Sync {
    fn interest(&self) -> EventType {
        EventType::any()
    }

    fn order(&self) -> Order {
        Order::Unordered
    }

    fn on_event(&self, event: &Event) -> std::result::Result<(), BoxError>;
}

/// Looks up listeners registered by name at delivery time.
pub trait ListenerResolver {
    fn resolve_listener(&self, name: &str) -> Result<Arc<dyn EventListener>>;
}

impl ListenerResolver for Registry {
    fn resolve_listener(&self, name: &str) -> Result<Arc<dyn EventListener>> {
        let instance = self.resolve(name)?;
        instance
            .listener()
            .cloned()
            .ok_or_else(|| ContainerError::NotRequiredType {
                name: name.to_string(),
                expected: "EventListener",
            })
    }
}

/// Closure-backed listener.
///
/// ```rust
/// use container_lifecycle::events::{listener_fn, EventListener};
/// use container_lifecycle::model::{Event, EventType};
///
/// let listener = listener_fn(EventType::new("context"), |event| {
///     println!("got {}", event.event_type());
///     Ok(())
/// });
/// assert_eq!(listener.interest().as_str(), "context");
/// ```
pub struct FnListener<F> {
    interest: EventType,
    order: Order,
    callback: F,
}

pub fn listener_fn<F>(interest: EventType, callback: F) -> FnListener<F>
where
    F: Fn(&Event) -> std::result::Result<(), BoxError> + Send + Sync,
{
    FnListener {
        interest,
        order: Order::Unordered,
        callback,
    }
}

impl<F> FnListener<F> {
    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }
}

impl<F> EventListener for FnListener<F>
where
    F: Fn(&Event) -> std::result::Result<(), BoxError> + Send + Sync,
{
    fn interest(&self) -> EventType {
        self.interest.clone()
    }

    fn order(&self) -> Order {
        self.order
    }

    fn on_event(&self, event: &Event) -> std::result::Result<(), BoxError> {
        (self.callback)(event)
    }
}
