use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Resolved type of an event, used for listener filtering.
///
/// Types form a dot-separated hierarchy: `context.refreshed` is assignable to
/// `context`, and every type is assignable to [`EventType::any`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventType(String);

impl EventType {
    pub const REFRESHED: &'static str = "context.refreshed";
    pub const CLOSED: &'static str = "context.closed";
    pub const STARTED: &'static str = "context.started";
    pub const STOPPED: &'static str = "context.stopped";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The root type every event is assignable to.
    pub fn any() -> Self {
        Self(String::new())
    }

    /// Type of payload events wrapping a `T`.
    pub fn of_payload<T: ?Sized>() -> Self {
        Self(format!("payload.{}", std::any::type_name::<T>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_assignable_to(&self, interest: &EventType) -> bool {
        if interest.0.is_empty() || self.0 == interest.0 {
            return true;
        }
        self.0
            .strip_prefix(interest.0.as_str())
            .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// An event travelling through the bus. Cloning shares the payload.
#[derive(Clone)]
pub struct Event {
    payload: Arc<dyn Any + Send + Sync>,
    source: String,
    timestamp: SystemTime,
    event_type: EventType,
}

impl Event {
    pub fn new<T: Any + Send + Sync>(
        event_type: EventType,
        source: impl Into<String>,
        payload: T,
    ) -> Self {
        Self {
            payload: Arc::new(payload),
            source: source.into(),
            timestamp: SystemTime::now(),
            event_type,
        }
    }

    /// Wraps an arbitrary value; the resolved type is derived from `T`.
    pub fn payload<T: Any + Send + Sync>(source: impl Into<String>, payload: T) -> Self {
        Self::new(EventType::of_payload::<T>(), source, payload)
    }

    /// A container lifecycle notification (`context.*`) with no payload.
    pub fn container(kind: &str, source: impl Into<String>) -> Self {
        Self::new(EventType::new(kind), source, ())
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("type", &self.event_type.as_str())
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_hierarchy() {
        let refreshed = EventType::new(EventType::REFRESHED);

        assert!(refreshed.is_assignable_to(&EventType::new("context")));
        assert!(refreshed.is_assignable_to(&EventType::any()));
        assert!(refreshed.is_assignable_to(&refreshed));
        assert!(!refreshed.is_assignable_to(&EventType::new("context.closed")));
        // Prefix must end on a segment boundary.
        assert!(!refreshed.is_assignable_to(&EventType::new("cont")));
        assert!(!EventType::new("context").is_assignable_to(&refreshed));
    }

    #[test]
    fn test_payload_event() {
        let event = Event::payload("app", 7u64);
        assert_eq!(event.payload_as::<u64>(), Some(&7));
        assert!(event.payload_as::<u32>().is_none());
        assert_eq!(event.event_type(), &EventType::of_payload::<u64>());
        assert_eq!(event.source(), "app");
    }
}
