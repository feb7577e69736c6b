//! # Observability & Tracing
//!
//! The [`setup_tracing`] function installs a compact `tracing_subscriber` that
//! is filtered through `RUST_LOG`.
//!
//! ## What Gets Traced
//!
//! - **Boot**: `refresh` opens a span per container; each step logs its outcome
//!   (definitions loaded, processors registered, singletons built).
//! - **Shutdown**: `close` opens a span; listener, stop and destroy failures are
//!   logged at `warn` and never abort the teardown.
//! - **Phases**: every start or stop group logs its phase and size.
//! - **Cache**: hits, misses and evictions, with statistics at `debug`.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Boot and shutdown milestones
//! RUST_LOG=info cargo test
//!
//! # Per-component detail: singleton creation, event delivery, cache stats
//! RUST_LOG=debug cargo test
//!
//! # Only the cache
//! RUST_LOG=container_lifecycle::cache=debug cargo test
//! ```
//!
//! ## Boot Trace Example
//!
//! **With `RUST_LOG=info`**:
//!
//! ```text
//! INFO refresh{container="app"}: Refreshing container
//! INFO refresh{container="app"}: Instance processors registered count=1
//! INFO refresh{container="app"}: Pre-instantiating singletons registry="app" definitions=4
//! INFO refresh{container="app"}: Starting lifecycle phase phase=0 count=2
//! INFO refresh{container="app"}: Container refreshed singletons=6
//! ```
//!
//! Spans show inline (`refresh{container="app"}:`), so interleaved boots of a
//! parent and a child container stay readable.

/// Initializes structured logging. Calling it more than once is harmless.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false) // container id and component name are fields already
        .compact()
        .try_init();
}
