//! Embedding error types.

use thiserror::Error;

/// Errors from embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Model initialization failed.
    #[error("Model initialization failed: {0}")]
    ModelInit(String),

    /// Inference failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Service not ready (model not loaded).
    #[error("Embedding service not ready")]
    NotReady,

    /// The embedding worker has stopped and no longer accepts jobs.
    #[error("Embedding worker is not running")]
    WorkerClosed,

    /// Generic internal error.
    #[error("{0}")]
    Internal(String),
}

/// Result alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;
