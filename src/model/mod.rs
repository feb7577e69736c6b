//! Pure data structures shared by the registry, the pipeline and the container.

pub mod definition;
pub mod environment;
pub mod event;
pub mod instance;

pub use definition::*;
pub use environment::*;
pub use event::*;
pub use instance::*;
