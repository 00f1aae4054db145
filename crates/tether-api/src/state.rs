//! Application state wiring the memory stack together.
//!
//! AppState pins the core ports to their infra implementations: LanceDB for
//! the index, fastembed or Gemini for embeddings, Gemini for reflections.
//! The embedding model and the summarizer are built on demand because
//! loading them is slow and most commands need neither.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use tether_core::memory::box_embedder::BoxEmbeddingProvider;
use tether_core::memory::box_vector::BoxVectorIndex;
use tether_core::memory::store::MemoryStore;
use tether_core::reflection::box_summarizer::BoxSummarizationProvider;
use tether_core::reflection::generator::ReflectionGenerator;
use tether_core::reflection::summarizer::SummarizationProvider;
use tether_infra::config::{load_config, resolve_api_key, resolve_data_dir};
use tether_infra::gemini::{GeminiClient, GeminiEmbedder, GeminiSummarizer};
use tether_infra::vector::embedder::FastEmbedProvider;
use tether_infra::vector::index::LanceVectorIndex;
use tether_infra::vector::lance::LanceVectorStore;
use tether_types::config::{EmbeddingProviderKind, TetherConfig};
use tether_types::error::SummarizeError;
use tether_types::memory::UserId;

/// Stand-in used when no API key is configured. Every call fails, so the
/// reflection generator falls back to its default insight.
struct UnconfiguredSummarizer;

impl SummarizationProvider for UnconfiguredSummarizer {
    async fn summarize(&self, _prompt: &str) -> Result<String, SummarizeError> {
        Err(SummarizeError::AuthenticationFailed)
    }

    fn model_name(&self) -> &str {
        "unconfigured"
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TetherConfig>,
    pub data_dir: PathBuf,
    pub index: Arc<BoxVectorIndex>,
}

impl AppState {
    /// Resolve the data dir, load config and open the vector store.
    pub async fn init() -> Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;
        let store = LanceVectorStore::in_data_dir(&data_dir)
            .await
            .context("Failed to open vector store")?;
        let index = LanceVectorIndex::new(store, config.memory.dimension);

        tracing::debug!(data_dir = %data_dir.display(), "app state initialized");
        Ok(Self {
            config: Arc::new(config),
            data_dir,
            index: Arc::new(BoxVectorIndex::new(index)),
        })
    }

    pub fn store(&self, user_id: &UserId) -> MemoryStore {
        MemoryStore::new(user_id.clone(), self.index.clone(), &self.config)
    }

    fn gemini_client(&self) -> Option<GeminiClient> {
        resolve_api_key(&self.config)
            .map(|key| GeminiClient::new(key, self.config.providers.gemini_base_url.clone()))
    }

    /// Build the configured embedding provider.
    pub async fn embedder(&self) -> Result<Arc<BoxEmbeddingProvider>> {
        let provider = match self.config.providers.embedding {
            EmbeddingProviderKind::Fastembed => {
                let cache_dir = self.data_dir.join("models");
                let provider = tokio::task::spawn_blocking(move || FastEmbedProvider::new(Some(cache_dir)))
                    .await
                    .context("Embedding model loader panicked")?
                    .context("Failed to load local embedding model")?;
                BoxEmbeddingProvider::new(provider)
            }
            EmbeddingProviderKind::Gemini => {
                let client = self.gemini_client().with_context(|| {
                    format!(
                        "Gemini embeddings need an API key in ${}",
                        self.config.providers.api_key_env
                    )
                })?;
                BoxEmbeddingProvider::new(GeminiEmbedder::new(
                    client,
                    self.config.providers.gemini_embedding_model.clone(),
                ))
            }
        };
        Ok(Arc::new(provider))
    }

    /// Build the reflection generator. Without an API key every reflection
    /// uses the default insight.
    pub fn reflection_generator(&self) -> ReflectionGenerator {
        let summarizer = match self.gemini_client() {
            Some(client) => BoxSummarizationProvider::new(GeminiSummarizer::new(
                client,
                self.config.providers.gemini_summary_model.clone(),
            )),
            None => {
                tracing::warn!(
                    env = %self.config.providers.api_key_env,
                    "no summarization API key, reflections will use the default insight"
                );
                BoxSummarizationProvider::new(UnconfiguredSummarizer)
            }
        };
        ReflectionGenerator::new(Arc::new(summarizer), &self.config)
    }

    pub fn has_api_key(&self) -> bool {
        resolve_api_key(&self.config).is_some()
    }
}
