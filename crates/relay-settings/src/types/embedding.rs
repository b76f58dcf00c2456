//! Embedding backend settings.

use serde::{Deserialize, Serialize};

/// Which embedding implementation the server runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// ONNX Runtime with a sentence-transformers model.
    #[default]
    Onnx,
    /// Deterministic hash-based vectors (no model download).
    Mock,
}

/// Embedding model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// Backend implementation.
    pub backend: EmbeddingBackend,
    /// Hugging Face model repository.
    pub model: String,
    /// Local model cache directory (may contain `~`).
    pub cache_dir: String,
    /// Output vector dimensions.
    pub dimensions: usize,
    /// Pending requests the embedding worker mailbox holds.
    pub worker_queue_depth: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Onnx,
            model: "sentence-transformers/all-mpnet-base-v2".to_string(),
            cache_dir: "~/.embed-relay/models".to_string(),
            dimensions: 768,
            worker_queue_depth: 64,
        }
    }
}
