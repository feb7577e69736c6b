#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Container Lifecycle
//!
//! > **A component container that boots, runs and tears down deterministically.**
//!
//! This crate is the orchestration core of a dependency-injection container: a
//! state machine that boots a hierarchical component registry, runs it through
//! an ordered pipeline of extension points, wires event propagation and phased
//! start/stop, and tears everything down in reverse. On top sits a cache that
//! memoizes whole boots by configuration identity.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Atomic boot, idempotent close
//! [`Container::refresh`](lifecycle::Container::refresh) either ends with an
//! active container or undoes every step it took: started components are
//! stopped, built singletons destroyed, the container returns to `New`.
//! [`Container::close`](lifecycle::Container::close) tears down exactly once,
//! however often or concurrently it is called.
//!
//! ### Explicit roles instead of reflection
//! A component announces what it is (listener, lifecycle component, processor,
//! disposable) when it is built, through [`Instance`](model::Instance)
//! builders. Definitions carry a [`Role`](model::Role) tag so the engine can
//! find processors and listeners before building them.
//!
//! ### No globals
//! Every container gets its own [`ContainerConfig`](lifecycle::ContainerConfig).
//! The [`ContextCache`](cache::ContextCache) is an ordinary value you
//! construct and share.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Store ([`registry`])
//! Names → definitions → instances, with parent delegation and dependency
//! tracking.
//! - **Key items**: [`Registry`](registry::Registry),
//!   [`Instantiator`](registry::Instantiator),
//!   [`DefinitionLoader`](registry::DefinitionLoader).
//!
//! ### 2. The Pipeline ([`pipeline`])
//! Registry processors run to a fixed point; instance processors bracket every
//! later construction; post-instance callbacks fire once eager singletons exist.
//!
//! ### 3. Events ([`events`])
//! Buffered-then-live multicast with type-hierarchy filtering and parent
//! propagation.
//!
//! ### 4. Phases ([`phase`])
//! Phase-ordered, dependency-aware start and stop with asynchronous stop
//! handles.
//!
//! ### 5. The Orchestrator ([`lifecycle`])
//! The [`Container`](lifecycle::Container) state machine, its settings and
//! message lookup. See [`lifecycle::tracing`] for log setup.
//!
//! ### 6. The Cache ([`cache`])
//! Booted containers keyed by [`ContextKey`](cache::ContextKey), with
//! hierarchy-aware invalidation and LRU eviction.
//!
//! ### Testing ([`mock`])
//! Recording components, listeners and a scripted instantiator.
//!
//! ## 🚀 Quick Start
//!
//! ```rust
//! use container_lifecycle::lifecycle::{Container, ContainerConfig};
//! use container_lifecycle::model::{Definition, Instance};
//! use container_lifecycle::registry::DefinitionSet;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> container_lifecycle::error::Result<()> {
//! let definitions = DefinitionSet::new()
//!     .with("greeting", Definition::of(|_| Ok(Instance::new(String::from("hello")))))
//!     .with("shout", Definition::of(|r| {
//!         let greeting = r.get_as::<String>("greeting")?;
//!         Ok(Instance::new(greeting.to_uppercase()))
//!     }));
//!
//! let container = Container::new(ContainerConfig::new("app").with_definitions(definitions));
//! container.refresh().await?;
//! assert_eq!(*container.get_as::<String>("shout")?, "HELLO");
//! container.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ### Running Tests
//!
//! ```bash
//! RUST_LOG=debug cargo test
//! ```

pub mod cache;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod mock;
pub mod model;
pub mod phase;
pub mod pipeline;
pub mod registry;
