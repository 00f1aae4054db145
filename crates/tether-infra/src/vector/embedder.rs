//! FastEmbed-based local embedding generator.
//!
//! Implements `EmbeddingProvider` from `tether-core` using fastembed's
//! BGESmallENV15 model (384 dimensions) with ONNX runtime inference.
//! Runs offline once the model files are cached.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tether_core::memory::embedder::EmbeddingProvider;
use tether_types::error::EmbeddingError;

use super::schema::DEFAULT_DIMENSION;

const MODEL_NAME: &str = "BAAI/bge-small-en-v1.5";

/// Local embedding provider.
///
/// `TextEmbedding::embed` requires `&mut self`, so the model sits behind a
/// `Mutex` and inference runs on the blocking pool.
pub struct FastEmbedProvider {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
}

impl FastEmbedProvider {
    /// Load the model, downloading it into `cache_dir` on first use.
    ///
    /// Blocks while the ONNX session is built; call from `spawn_blocking`
    /// inside async contexts.
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self, EmbeddingError> {
        let mut options =
            fastembed::InitOptions::new(fastembed::EmbeddingModel::BGESmallENV15)
                .with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }
        let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
            EmbeddingError::Provider {
                message: format!("Failed to load embedding model: {e}"),
            }
        })?;
        tracing::info!(model = MODEL_NAME, "local embedding model loaded");
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        let mut vectors = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().expect("embedding model lock poisoned");
            model.embed(vec![text.as_str()], None)
        })
        .await
        .map_err(|e| EmbeddingError::Provider {
            message: format!("embedding task failed: {e}"),
        })?
        .map_err(|e| EmbeddingError::Provider {
            message: e.to_string(),
        })?;

        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Malformed("model returned no vectors".to_string()))
    }

    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn dimension(&self) -> usize {
        DEFAULT_DIMENSION
    }
}
