//! Backend construction and background model loading.

use std::sync::Arc;

use relay_settings::EmbeddingBackend;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::EmbeddingConfig;
use crate::errors::Result;
use crate::gate::ReadinessGate;
use crate::service::{EmbeddingService, MockEmbeddingService};

/// A constructed backend and the task (if any) loading its model.
pub struct LoadedBackend {
    /// The service to hand to the worker.
    pub service: Arc<dyn EmbeddingService>,
    /// Background load task; `None` when the backend needed no loading.
    pub load_task: Option<JoinHandle<()>>,
}

/// Build the configured backend and start loading its model.
///
/// `gate` opens once the model is usable, or settles as failed with the load
/// error. The mock backend opens the gate immediately.
pub fn start_backend(config: &EmbeddingConfig, gate: Arc<ReadinessGate>) -> Result<LoadedBackend> {
    match config.backend {
        EmbeddingBackend::Mock => {
            info!(dims = config.dimensions, "using mock embeddings");
            let _ = gate.mark_ready();
            Ok(LoadedBackend {
                service: Arc::new(MockEmbeddingService::new(config.dimensions)),
                load_task: None,
            })
        }
        EmbeddingBackend::Onnx => start_onnx(config, gate),
    }
}

#[cfg(feature = "ort")]
fn start_onnx(config: &EmbeddingConfig, gate: Arc<ReadinessGate>) -> Result<LoadedBackend> {
    use crate::ort_service::OnnxEmbeddingService;

    let service = Arc::new(OnnxEmbeddingService::new(config.clone()));
    let loading = Arc::clone(&service);
    let load_task = tokio::spawn(async move {
        let started = std::time::Instant::now();
        match loading.initialize().await {
            Ok(()) => {
                info!(elapsed_ms = started.elapsed().as_millis(), "model loaded");
                let _ = gate.mark_ready();
            }
            Err(e) => {
                let _ = gate.mark_failed(e.to_string());
            }
        }
    });
    Ok(LoadedBackend {
        service,
        load_task: Some(load_task),
    })
}

#[cfg(not(feature = "ort"))]
fn start_onnx(_config: &EmbeddingConfig, _gate: Arc<ReadinessGate>) -> Result<LoadedBackend> {
    Err(crate::errors::EmbeddingError::ModelInit(
        "ONNX backend requires the `ort` feature; use the mock backend instead".into(),
    ))
}
