//! Container orchestration: the boot/close state machine, its configuration,
//! message resolution and log setup.
//!
//! # Main Components
//!
//! - [`Container`] - runs the boot sequence and owns the registry, event bus
//!   and phase controller of one container
//! - [`ContainerConfig`] / [`ContainerSettings`] - what to boot and how
//! - [`MessageSource`] - code-to-text lookup with parent fallback
//! - [`setup_tracing`] - initializes logging

pub mod config;
pub mod container;
pub mod message;
pub mod tracing;

pub use self::config::*;
pub use self::container::*;
pub use self::message::*;
pub use self::tracing::setup_tracing;
