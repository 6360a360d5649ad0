//! Handles to a running supervisor

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::SupervisorStats;

/// Requests a stop from any task or thread
#[derive(Debug, Clone)]
pub struct StopHandle {
    cancel: CancellationToken,
}

impl StopHandle {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Ask the supervisor to stop. Calling it again has no effect.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Bridge stop requested");
        }
        self.cancel.cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Owner handle for a supervisor spawned with
/// [`ConnectionSupervisor::start`](super::ConnectionSupervisor::start)
pub struct BridgeHandle {
    stop: StopHandle,
    task: JoinHandle<SupervisorStats>,
}

impl BridgeHandle {
    pub(crate) fn new(cancel: CancellationToken, task: JoinHandle<SupervisorStats>) -> Self {
        Self {
            stop: StopHandle::new(cancel),
            task,
        }
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// True once the supervisor reached `Stopped`
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the supervisor to finish on its own
    pub async fn join(self) -> Result<SupervisorStats> {
        self.task.await.context("Bridge supervisor task failed")
    }

    /// Stop, then wait until the supervisor released everything
    pub async fn shutdown(self) -> Result<SupervisorStats> {
        self.stop();
        self.join().await
    }
}
