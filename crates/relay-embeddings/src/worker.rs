//! Single-slot embedding worker.
//!
//! One task owns the [`EmbeddingService`] and drains a bounded mailbox, so at
//! most one embedding computation is in flight across the whole process no
//! matter how many sessions submit work. Callers hold a cloneable
//! [`EmbeddingHandle`] and await a oneshot reply.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{EmbeddingError, Result};
use crate::service::EmbeddingService;

struct EmbedRequest {
    text: String,
    reply: oneshot::Sender<Result<Vec<f32>>>,
}

/// Cloneable submission side of the worker mailbox.
#[derive(Clone, Debug)]
pub struct EmbeddingHandle {
    tx: mpsc::Sender<EmbedRequest>,
}

impl std::fmt::Debug for EmbedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedRequest")
            .field("len", &self.text.len())
            .finish_non_exhaustive()
    }
}

impl EmbeddingHandle {
    /// Queue `text` and wait for its vector.
    pub async fn embed(&self, text: String) -> Result<Vec<f32>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EmbedRequest { text, reply })
            .await
            .map_err(|_| EmbeddingError::WorkerClosed)?;
        rx.await.map_err(|_| EmbeddingError::WorkerClosed)?
    }
}

/// The task that owns the embedding service.
pub struct EmbeddingWorker {
    service: Arc<dyn EmbeddingService>,
    rx: mpsc::Receiver<EmbedRequest>,
    cancel: CancellationToken,
}

impl EmbeddingWorker {
    /// Create a worker and its handle. Call [`EmbeddingWorker::spawn`] to
    /// start it.
    pub fn new(
        service: Arc<dyn EmbeddingService>,
        queue_depth: usize,
        cancel: CancellationToken,
    ) -> (Self, EmbeddingHandle) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        (
            Self {
                service,
                rx,
                cancel,
            },
            EmbeddingHandle { tx },
        )
    }

    /// Start the worker on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process requests until cancelled or every handle is dropped.
    ///
    /// Cancellation is only observed between jobs; a computation that has
    /// started always completes and replies.
    pub async fn run(mut self) {
        info!(dims = self.service.dimensions(), "embedding worker started");
        loop {
            let request = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                request = self.rx.recv() => request,
            };
            let Some(request) = request else {
                break;
            };
            let started = Instant::now();
            let result = self.service.embed_single(&request.text).await;
            debug!(
                bytes = request.text.len(),
                ok = result.is_ok(),
                elapsed_ms = started.elapsed().as_millis(),
                "embedding computed"
            );
            let _ = request.reply.send(result);
        }
        self.rx.close();
        info!("embedding worker stopped");
    }
}
