//! Embedding dispatch.
//!
//! Turns a completed payload or query into exactly one [`JobResult`] on a
//! [`ResultQueue`]. The first job waits for the model readiness gate; every
//! job then goes through the single-slot embedding worker.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use relay_core::JobResult;
use relay_embeddings::{EmbeddingHandle, ReadinessGate, Result};
use tracing::debug;

use crate::metrics::{EMBED_DURATION_SECONDS, JOBS_TOTAL};
use crate::result_queue::ResultQueue;

/// Text that needs an embedding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Job {
    /// A reassembled DATA payload.
    Document {
        /// Payload id.
        id: String,
        /// Full text.
        text: String,
    },
    /// A QUERY message.
    Query {
        /// Optional caller id.
        id: Option<String>,
        /// Query text.
        text: String,
    },
}

impl Job {
    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Document { .. } => "document",
            Self::Query { .. } => "query",
        }
    }
}

/// Submits jobs to the embedding worker and enqueues results.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    gate: Arc<ReadinessGate>,
    embedder: EmbeddingHandle,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(gate: Arc<ReadinessGate>, embedder: EmbeddingHandle) -> Self {
        Self { gate, embedder }
    }

    /// Embed `job` and push its result onto `queue`.
    ///
    /// On error nothing is enqueued.
    pub async fn dispatch(&self, job: Job, queue: &ResultQueue) -> Result<()> {
        self.gate.wait_ready().await?;

        counter!(JOBS_TOTAL, "kind" => job.kind()).increment(1);
        let started = Instant::now();
        let result = match job {
            Job::Document { id, text } => {
                let vector = self.embedder.embed(text).await?;
                JobResult::document(id, vector)
            }
            Job::Query { id, text } => {
                let vector = self.embedder.embed(text).await?;
                JobResult::query(id, vector)
            }
        };
        histogram!(EMBED_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        debug!(
            payload_id = %result.id,
            is_query = result.is_query,
            dims = result.vector.len(),
            "result queued"
        );
        queue.push(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use relay_core::ANONYMOUS_QUERY_ID;
    use relay_embeddings::{EmbeddingError, EmbeddingWorker, MockEmbeddingService};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn dispatcher(gate: Arc<ReadinessGate>) -> Dispatcher {
        let (worker, handle) = EmbeddingWorker::new(
            Arc::new(MockEmbeddingService::new(4)),
            8,
            CancellationToken::new(),
        );
        let _task = worker.spawn();
        Dispatcher::new(gate, handle)
    }

    #[tokio::test]
    async fn document_result_echoes_id() {
        let d = dispatcher(Arc::new(ReadinessGate::ready()));
        let queue = ResultQueue::new();
        d.dispatch(
            Job::Document {
                id: "a".into(),
                text: "hello".into(),
            },
            &queue,
        )
        .await
        .unwrap();
        let result = queue.try_pop().unwrap();
        assert_eq!(result.id, "a");
        assert!(!result.is_query);
        assert_eq!(result.vector.len(), 4);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn anonymous_query_uses_sentinel() {
        let d = dispatcher(Arc::new(ReadinessGate::ready()));
        let queue = ResultQueue::new();
        d.dispatch(
            Job::Query {
                id: None,
                text: "foo".into(),
            },
            &queue,
        )
        .await
        .unwrap();
        let result = queue.try_pop().unwrap();
        assert_eq!(result.id, ANONYMOUS_QUERY_ID);
        assert!(result.is_query);
    }

    #[tokio::test]
    async fn waits_for_gate() {
        let gate = Arc::new(ReadinessGate::new());
        let d = dispatcher(Arc::clone(&gate));
        let queue = Arc::new(ResultQueue::new());
        let job = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                d.dispatch(
                    Job::Query {
                        id: Some("q".into()),
                        text: "x".into(),
                    },
                    &queue,
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.is_empty());
        let _ = gate.mark_ready();
        job.await.unwrap().unwrap();
        assert_eq!(queue.try_pop().unwrap().id, "q");
    }

    #[tokio::test]
    async fn failed_gate_enqueues_nothing() {
        let gate = Arc::new(ReadinessGate::new());
        let _ = gate.mark_failed("download failed");
        let d = dispatcher(gate);
        let queue = ResultQueue::new();
        let result = d
            .dispatch(
                Job::Query {
                    id: None,
                    text: "x".into(),
                },
                &queue,
            )
            .await;
        assert_matches!(result, Err(EmbeddingError::ModelInit(_)));
        assert!(queue.is_empty());
    }

    #[test]
    fn job_kind_labels() {
        let doc = Job::Document {
            id: "a".into(),
            text: String::new(),
        };
        let query = Job::Query {
            id: None,
            text: String::new(),
        };
        assert_eq!(doc.kind(), "document");
        assert_eq!(query.kind(), "query");
    }
}
