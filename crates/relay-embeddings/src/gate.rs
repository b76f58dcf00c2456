//! Model readiness gate.
//!
//! A one-shot signal that starts closed while the model loads. Once it
//! reaches [`Readiness::Ready`] or [`Readiness::Failed`] it never changes
//! again. Waiters block until the gate leaves [`Readiness::Loading`].

use tokio::sync::watch;
use tracing::{info, warn};

use crate::errors::{EmbeddingError, Result};

/// Gate state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Model is still loading; jobs wait.
    Loading,
    /// Model loaded; jobs run.
    Ready,
    /// Model failed to load; jobs fail with the given reason.
    Failed(String),
}

/// One-shot model readiness signal shared by every session.
#[derive(Debug)]
pub struct ReadinessGate {
    tx: watch::Sender<Readiness>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    /// A closed gate.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Readiness::Loading);
        Self { tx }
    }

    /// A gate that is already open.
    pub fn ready() -> Self {
        let gate = Self::new();
        let _ = gate.mark_ready();
        gate
    }

    /// Open the gate. Returns `false` if it had already settled.
    pub fn mark_ready(&self) -> bool {
        let changed = self.settle(Readiness::Ready);
        if changed {
            info!("embedding model ready");
        }
        changed
    }

    /// Settle the gate as failed. Returns `false` if it had already settled.
    pub fn mark_failed(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let changed = self.settle(Readiness::Failed(reason.clone()));
        if changed {
            warn!(reason, "embedding model failed to load");
        }
        changed
    }

    fn settle(&self, next: Readiness) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == Readiness::Loading {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Current state.
    pub fn state(&self) -> Readiness {
        self.tx.borrow().clone()
    }

    /// Whether the gate is open.
    pub fn is_ready(&self) -> bool {
        *self.tx.borrow() == Readiness::Ready
    }

    /// Wait until the gate settles.
    ///
    /// Returns immediately once open; returns [`EmbeddingError::ModelInit`]
    /// if loading failed.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.tx.subscribe();
        let settled = rx
            .wait_for(|state| *state != Readiness::Loading)
            .await
            .map_err(|_| EmbeddingError::Internal("readiness gate dropped".into()))?
            .clone();
        match settled {
            Readiness::Failed(reason) => Err(EmbeddingError::ModelInit(reason)),
            Readiness::Ready | Readiness::Loading => Ok(()),
        }
    }
}
