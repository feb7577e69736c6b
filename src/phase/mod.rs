//! # Phased Start/Stop
//!
//! Components that implement [`Lifecycle`] are started after every eager
//! singleton exists and stopped before any of them is destroyed. The
//! [`PhaseController`] groups them by [`Lifecycle::phase`]: groups start in
//! ascending phase and stop in descending phase. A declared dependency wins over
//! phase order, so a dependency always starts before and stops after the
//! components that depend on it.
//!
//! Stopping is asynchronous: [`Lifecycle::request_stop`] returns a
//! [`StopHandle`] that resolves once the component has actually stopped.

pub mod controller;

pub use controller::*;

use crate::error::BoxError;
use async_trait::async_trait;
use tokio::sync::oneshot;

#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn start(&self) -> Result<(), BoxError>;

    async fn stop(&self) -> Result<(), BoxError>;

    fn is_running(&self) -> bool;

    fn phase(&self) -> i32 {
        0
    }

    /// Whether the component starts on boot, or only through an explicit
    /// `Container::start`.
    fn is_auto_startup(&self) -> bool {
        true
    }

    /// Begins stopping and returns a handle for completion. The default stops
    /// inline.
    async fn request_stop(&self) -> Result<StopHandle, BoxError> {
        self.stop().await?;
        Ok(StopHandle::completed())
    }
}

/// Completion handle returned by [`Lifecycle::request_stop`].
#[derive(Debug)]
pub struct StopHandle {
    rx: Option<oneshot::Receiver<()>>,
}

impl StopHandle {
    /// A handle for a component that already stopped.
    pub fn completed() -> Self {
        Self { rx: None }
    }

    /// A pending handle plus the signal that completes it.
    pub fn pair() -> (StopSignal, StopHandle) {
        let (tx, rx) = oneshot::channel();
        (StopSignal { tx }, StopHandle { rx: Some(rx) })
    }

    /// Resolves once the component stopped. False if the signal was dropped
    /// without completing.
    pub async fn stopped(self) -> bool {
        match self.rx {
            Some(rx) => rx.await.is_ok(),
            None => true,
        }
    }
}

#[derive(Debug)]
pub struct StopSignal {
    tx: oneshot::Sender<()>,
}

impl StopSignal {
    pub fn complete(self) {
        let _ = self.tx.send(());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
}
