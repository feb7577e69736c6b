//! # Container Errors
//!
//! This module defines the error taxonomy shared by every part of the engine.
//! Boot-time errors abort `refresh()` and trigger rollback; shutdown-time errors
//! are logged by the caller and never surface through this type.

use std::fmt;

/// Boxed cause carried by errors that originate in user-supplied code
/// (processors, listeners, lifecycle components, instantiators).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Which side of the active window a read operation fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveReason {
    /// `refresh()` has not completed (or was rolled back).
    NotBooted,
    /// `close()` already ran.
    AlreadyClosed,
    /// `refresh()` was called on a container that is already active.
    AlreadyActive,
}

impl fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InactiveReason::NotBooted => write!(f, "has not been refreshed yet"),
            InactiveReason::AlreadyClosed => write!(f, "has been closed already"),
            InactiveReason::AlreadyActive => write!(f, "is already active"),
        }
    }
}

/// Errors that can occur while booting, using or closing a container.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("No definition named '{0}' in this registry or any ancestor")]
    NoSuchDefinition(String),

    #[error("Cannot register definition '{name}': {reason}")]
    DuplicateDefinition { name: String, reason: String },

    #[error("Registry processors did not converge after {iterations} passes")]
    PipelineDivergence { iterations: usize },

    #[error("Initialization of '{name}' failed: {source}")]
    InitializationFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Required properties not resolvable: {}", .0.join(", "))]
    MissingRequiredProperty(Vec<String>),

    #[error("Container '{id}' {reason}")]
    IllegalState { id: String, reason: InactiveReason },

    #[error("Failed to start component '{name}': {source}")]
    StartFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Component '{0}' is currently in creation (circular reference?)")]
    CurrentlyInCreation(String),

    #[error("Listener failed handling '{event_type}' ({suppressed} further failures logged): {source}")]
    ListenerFailed {
        event_type: String,
        suppressed: usize,
        #[source]
        source: BoxError,
    },

    #[error("Component '{name}' is not of the required type {expected}")]
    NotRequiredType { name: String, expected: &'static str },
}

impl ContainerError {
    /// Wraps an arbitrary cause as an initialization failure of `name`.
    pub fn init_failed(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ContainerError::InitializationFailed {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Keeps container errors raised by nested resolution intact, so a missing
    /// dependency still reads as `NoSuchDefinition` to the caller.
    pub(crate) fn from_boxed(name: &str, source: BoxError) -> Self {
        match source.downcast::<ContainerError>() {
            Ok(inner) => *inner,
            Err(other) => ContainerError::init_failed(name, other),
        }
    }
}
