//! Graceful shutdown coordination via `CancellationToken`.
//!
//! The coordinator's token is the server's running flag: cancelling it is
//! the only way the manager, the sessions and (under the global failure
//! scope) a failing session stop the service.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default timeout for draining tasks before aborting them.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the process-wide running flag.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Clear the running flag.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until someone clears the running flag.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Clear the running flag and drain `handles`.
    ///
    /// Waits up to `timeout` for every task, then aborts the rest. Returns
    /// how many tasks had to be aborted.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> usize {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_ms = timeout.as_millis(),
            "waiting for tasks to complete"
        );

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let drain = futures::future::join_all(handles);

        if tokio::time::timeout(timeout, drain).await.is_ok() {
            return 0;
        }
        let stragglers = aborts.iter().filter(|h| !h.is_finished()).count();
        warn!(stragglers, "shutdown timed out after {timeout:?}, aborting remaining tasks");
        for handle in &aborts {
            handle.abort();
        }
        stragglers
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
