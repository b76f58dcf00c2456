//! # relay-embeddings
//!
//! The embedding side of the relay:
//! - [`EmbeddingService`]: `encode(text) -> vector`, assumed non-reentrant
//! - [`ReadinessGate`]: one-shot signal opened when the model has loaded
//! - [`EmbeddingWorker`]: a single task that owns the service and runs one
//!   embedding at a time, fed through an [`EmbeddingHandle`] mailbox
//!
//! The ONNX backend (sentence-transformers via `ort`) is behind the `ort`
//! feature.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod gate;
pub mod loader;
pub mod normalize;
#[cfg(feature = "ort")]
pub mod ort_service;
pub mod service;
pub mod worker;

pub use config::EmbeddingConfig;
pub use errors::{EmbeddingError, Result};
pub use gate::{Readiness, ReadinessGate};
pub use loader::{start_backend, LoadedBackend};
pub use service::{EmbeddingService, MockEmbeddingService};
pub use worker::{EmbeddingHandle, EmbeddingWorker};
