//! Embedding configuration.

use relay_settings::{EmbeddingBackend, EmbeddingSettings};
use serde::{Deserialize, Serialize};

/// Configuration for the embedding system.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    /// Backend implementation.
    pub backend: EmbeddingBackend,
    /// Hugging Face model repository.
    pub model: String,
    /// Local model cache directory (may contain `~`).
    pub cache_dir: String,
    /// Output vector dimensions.
    pub dimensions: usize,
    /// Capacity of the worker mailbox.
    pub worker_queue_depth: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::from_settings(&EmbeddingSettings::default())
    }
}

impl EmbeddingConfig {
    /// Create config from settings.
    pub fn from_settings(s: &EmbeddingSettings) -> Self {
        Self {
            backend: s.backend,
            model: s.model.clone(),
            cache_dir: s.cache_dir.clone(),
            dimensions: s.dimensions,
            worker_queue_depth: s.worker_queue_depth.max(1),
        }
    }

    /// Resolve the cache directory, expanding `~/` to the home directory.
    pub fn resolved_cache_dir(&self) -> String {
        if let Some(rest) = self.cache_dir.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return format!("{home}/{rest}");
            }
        }
        self.cache_dir.clone()
    }

    /// A mock-backed config with the given dimensions.
    pub fn mock(dimensions: usize) -> Self {
        Self {
            backend: EmbeddingBackend::Mock,
            dimensions,
            ..Self::default()
        }
    }
}
