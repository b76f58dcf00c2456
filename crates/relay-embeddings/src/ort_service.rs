//! ONNX Runtime embedding service (feature-gated behind `ort`).
//!
//! Downloads a sentence-transformers ONNX export via `hf-hub`, tokenizes with
//! `tokenizers`, runs inference via `ort`, then mean-pools the token
//! embeddings under the attention mask and L2-normalizes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::errors::{EmbeddingError, Result};
use crate::normalize::{l2_normalize, mean_pool};
use crate::service::EmbeddingService;

/// ONNX-based sentence embedding service.
pub struct OnnxEmbeddingService {
    config: EmbeddingConfig,
    session: parking_lot::Mutex<Option<ort::session::Session>>,
    tokenizer: parking_lot::Mutex<Option<tokenizers::Tokenizer>>,
    ready: AtomicBool,
}

impl OnnxEmbeddingService {
    /// Create a new ONNX embedding service (not yet initialized).
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config,
            session: parking_lot::Mutex::new(None),
            tokenizer: parking_lot::Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }

    /// Download model + tokenizer and create the ONNX session.
    ///
    /// The blocking work runs on the blocking pool.
    pub async fn initialize(&self) -> Result<()> {
        let (tok, session) = tokio::task::spawn_blocking({
            let config = self.config.clone();
            move || -> Result<(tokenizers::Tokenizer, ort::session::Session)> {
                let (model_path, tokenizer_path) = download_model(&config)?;

                info!(model = %model_path.display(), "loading ONNX model");

                let tok = tokenizers::Tokenizer::from_file(&tokenizer_path)
                    .map_err(|e| EmbeddingError::ModelInit(format!("tokenizer load: {e}")))?;

                let session = ort::session::Session::builder()
                    .map_err(|e| EmbeddingError::ModelInit(format!("session builder: {e}")))?
                    .with_intra_threads(2)
                    .map_err(|e| EmbeddingError::ModelInit(format!("thread config: {e}")))?
                    .with_log_level(ort::logging::LogLevel::Warning)
                    .map_err(|e| EmbeddingError::ModelInit(format!("log level: {e}")))?
                    .commit_from_file(&model_path)
                    .map_err(|e| EmbeddingError::ModelInit(format!("model load: {e}")))?;

                Ok((tok, session))
            }
        })
        .await
        .map_err(|e| EmbeddingError::Internal(format!("join error: {e}")))??;

        *self.tokenizer.lock() = Some(tok);
        *self.session.lock() = Some(session);
        self.ready.store(true, Ordering::SeqCst);

        info!(model = %self.config.model, "ONNX embedding service ready");
        Ok(())
    }

    /// Expected model cache path.
    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(self.config.resolved_cache_dir())
    }
}

/// Download model files via `hf-hub`, returning (`model_path`, `tokenizer_path`).
fn download_model(config: &EmbeddingConfig) -> Result<(PathBuf, PathBuf)> {
    let cache_dir = config.resolved_cache_dir();
    debug!(cache_dir, model = %config.model, "fetching model via hf-hub");

    let api = hf_hub::api::sync::ApiBuilder::new()
        .with_cache_dir(PathBuf::from(&cache_dir))
        .build()
        .map_err(|e| EmbeddingError::ModelInit(format!("hf-hub api: {e}")))?;

    let repo = api.model(config.model.clone());

    let model_path = repo
        .get("onnx/model.onnx")
        .map_err(|e| EmbeddingError::ModelInit(format!("model download: {e}")))?;
    let tokenizer_path = repo
        .get("tokenizer.json")
        .map_err(|e| EmbeddingError::ModelInit(format!("tokenizer download: {e}")))?;

    info!(model = %model_path.display(), tokenizer = %tokenizer_path.display(), "model files ready");
    Ok((model_path, tokenizer_path))
}

/// Run inference on a batch of texts.
fn run_inference(
    session: &mut ort::session::Session,
    tokenizer: &tokenizers::Tokenizer,
    texts: &[String],
    dimensions: usize,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| EmbeddingError::Inference(format!("tokenize: {e}")))?;

    let max_len = encodings
        .iter()
        .map(|e| e.get_ids().len())
        .max()
        .unwrap_or(0);
    if max_len == 0 {
        return Err(EmbeddingError::Inference("empty tokenization".into()));
    }

    let batch_size = texts.len();
    let mut input_ids = vec![0i64; batch_size * max_len];
    let mut attention_mask = vec![0i64; batch_size * max_len];

    for (i, enc) in encodings.iter().enumerate() {
        let offset = i * max_len;
        for (j, &id) in enc.get_ids().iter().enumerate() {
            input_ids[offset + j] = i64::from(id);
        }
        for (j, &m) in enc.get_attention_mask().iter().enumerate() {
            attention_mask[offset + j] = i64::from(m);
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    let shape = vec![batch_size as i64, max_len as i64];

    let input_ids_tensor = ort::value::Tensor::from_array((shape.clone(), input_ids))
        .map_err(|e| EmbeddingError::Inference(format!("input_ids tensor: {e}")))?;
    let attention_mask_tensor =
        ort::value::Tensor::from_array((shape, attention_mask.clone()))
            .map_err(|e| EmbeddingError::Inference(format!("attention_mask tensor: {e}")))?;

    let outputs = session
        .run(ort::inputs![input_ids_tensor, attention_mask_tensor])
        .map_err(|e| EmbeddingError::Inference(format!("inference: {e}")))?;

    // [batch_size, seq_len, hidden_dim]
    let (output_shape, output_data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| EmbeddingError::Inference(format!("extract tensor: {e}")))?;

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let dims: Vec<usize> = output_shape.iter().map(|&d| d as usize).collect();
    if dims.len() != 3 || dims[0] != batch_size {
        return Err(EmbeddingError::Inference(format!(
            "unexpected output shape: {output_shape:?}"
        )));
    }
    let (seq_len_out, hidden_dim) = (dims[1], dims[2]);
    if hidden_dim != dimensions {
        return Err(EmbeddingError::Inference(format!(
            "model produced {hidden_dim} dimensions, expected {dimensions}"
        )));
    }

    let mut results = Vec::with_capacity(batch_size);
    for i in 0..batch_size {
        let hidden = &output_data[i * seq_len_out * hidden_dim..(i + 1) * seq_len_out * hidden_dim];
        let mask = &attention_mask[i * max_len..i * max_len + seq_len_out.min(max_len)];
        let mut pooled = mean_pool(hidden, mask, hidden_dim);
        l2_normalize(&mut pooled);
        results.push(pooled);
    }

    Ok(results)
}

impl OnnxEmbeddingService {
    fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if !self.is_ready() {
            return Err(EmbeddingError::NotReady);
        }

        let mut session_guard = self.session.lock();
        let tokenizer_guard = self.tokenizer.lock();

        let session = session_guard.as_mut().ok_or(EmbeddingError::NotReady)?;
        let tokenizer = tokenizer_guard.as_ref().ok_or(EmbeddingError::NotReady)?;

        run_inference(session, tokenizer, texts, self.config.dimensions)
    }
}

#[async_trait]
impl EmbeddingService for OnnxEmbeddingService {
    /// Inference blocks the calling thread; requires the multi-threaded
    /// runtime.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tokio::task::block_in_place(|| self.embed_blocking(texts))
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }
}
