//! Dynamic context retrieval.
//!
//! Turns free text into a formatted block of similar past successful
//! interventions, or nothing. Every failure on this path degrades to an
//! empty result.

use std::sync::Arc;
use std::time::Duration;

use tether_types::config::TetherConfig;
use tether_types::error::EmbeddingError;
use tether_types::memory::SimilarIntervention;

use crate::memory::box_embedder::BoxEmbeddingProvider;
use crate::memory::store::MemoryStore;
use crate::retry::RetryPolicy;

/// Embed `text` under a time budget with retries.
pub(crate) async fn embed_bounded(
    embedder: &BoxEmbeddingProvider,
    text: &str,
    budget: Duration,
    retry: &RetryPolicy,
) -> Result<Vec<f32>, EmbeddingError> {
    retry
        .run("embed", || async {
            match tokio::time::timeout(budget, embedder.embed(text)).await {
                Ok(result) => result,
                Err(_) => Err(EmbeddingError::Timeout(budget.as_millis() as u64)),
            }
        })
        .await
}

/// Render accepted examples as a prompt block.
pub fn format_examples(examples: &[SimilarIntervention]) -> String {
    let mut out = String::from("Similar past situations where an intervention worked:");
    for (i, ex) in examples.iter().enumerate() {
        out.push_str(&format!(
            "\n\nExample {}:\n- Context: {}\n- Intervention: {}\n- Outcome: {} (similarity {:.2})",
            i + 1,
            ex.context,
            ex.intervention_text,
            ex.outcome,
            ex.similarity,
        ));
    }
    out
}

/// Semantic retrieval of successful past interventions for one user.
pub struct RetrievalEngine {
    store: Arc<MemoryStore>,
    embedder: Arc<BoxEmbeddingProvider>,
    acceptance_threshold: f32,
    embed_timeout: Duration,
    retry: RetryPolicy,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: Arc<BoxEmbeddingProvider>,
        config: &TetherConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            acceptance_threshold: config.retrieval.acceptance_threshold,
            embed_timeout: config.timeouts.embed(),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Similar successful interventions for `query_text`, unfiltered by threshold.
    pub async fn similar(&self, query_text: &str, k: usize) -> Vec<SimilarIntervention> {
        match embed_bounded(&self.embedder, query_text, self.embed_timeout, &self.retry).await {
            Ok(vector) => self.store.find_similar(&vector, k, true).await,
            Err(e) => {
                tracing::warn!(user_id = %self.store.user_id(), error = %e, "query embedding failed");
                Vec::new()
            }
        }
    }

    /// Formatted examples when the best match clears the acceptance threshold.
    ///
    /// Returns an empty string when nothing relevant is found or anything fails.
    #[tracing::instrument(
        name = "retrieval.get_dynamic_context",
        skip(self, query_text),
        fields(user_id = %self.store.user_id(), query_len = query_text.len())
    )]
    pub async fn get_dynamic_context(&self, query_text: &str, k: usize) -> String {
        if query_text.trim().is_empty() {
            return String::new();
        }
        let results = self.similar(query_text, k).await;
        let Some(top) = results.first() else {
            return String::new();
        };
        if top.similarity <= self.acceptance_threshold {
            tracing::debug!(
                top_similarity = top.similarity,
                threshold = self.acceptance_threshold,
                "best match below acceptance threshold"
            );
            return String::new();
        }
        tracing::debug!(
            top_similarity = top.similarity,
            examples = results.len(),
            "dynamic context found"
        );
        format_examples(&results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::box_vector::BoxVectorIndex;
    use crate::test_support::{HashingEmbedder, InMemoryIndex, TEST_DIM};
    use tether_types::memory::{NewIntervention, Outcome, UserId};

    const CONTEXTS: [(&str, Outcome); 4] = [
        ("I can't focus on my homework", Outcome::TaskCompleted),
        ("I'm feeling overwhelmed with cleaning my room", Outcome::TaskCompleted),
        ("I need help staying focused", Outcome::ReEngaged),
        ("I'm stressed about this project", Outcome::ReEngaged),
    ];

    async fn seeded_engine(config: &TetherConfig) -> RetrievalEngine {
        let helper = HashingEmbedder::new(TEST_DIM);
        let store = Arc::new(MemoryStore::new(
            UserId::parse("scenario_user").unwrap(),
            Arc::new(BoxVectorIndex::new(InMemoryIndex::new())),
            config,
        ));
        assert!(store.ensure_index().await);
        for (context, outcome) in CONTEXTS {
            store
                .record_intervention(NewIntervention {
                    intervention_text: format!("create_microsteps: Created 3 micro-steps for: {context}"),
                    context: context.to_string(),
                    task: "general".to_string(),
                    outcome,
                    embedding: helper.vector(context),
                })
                .await
                .unwrap();
        }
        RetrievalEngine::new(
            store,
            Arc::new(BoxEmbeddingProvider::new(HashingEmbedder::new(TEST_DIM))),
            config,
        )
    }

    #[tokio::test]
    async fn test_similar_query_ranks_homework_first() {
        let engine = seeded_engine(&TetherConfig::default()).await;
        let results = engine.similar("I can't focus on my assignment", 3).await;

        assert!(!results.is_empty() && results.len() <= 3);
        assert_eq!(results[0].context, "I can't focus on my homework");
        assert!(results[0].similarity > 0.7);
    }

    #[tokio::test]
    async fn test_dynamic_context_formats_examples() {
        let engine = seeded_engine(&TetherConfig::default()).await;
        let context = engine
            .get_dynamic_context("I can't focus on my assignment", 3)
            .await;

        assert!(context.starts_with("Similar past situations"));
        assert!(context.contains("Example 1:\n- Context: I can't focus on my homework"));
        assert!(context.contains("- Outcome: task_completed"));
    }

    #[tokio::test]
    async fn test_unrelated_query_returns_empty() {
        let engine = seeded_engine(&TetherConfig::default()).await;
        let context = engine
            .get_dynamic_context("What's the weather like today?", 3)
            .await;
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_is_configurable() {
        let mut config = TetherConfig::default();
        config.retrieval.acceptance_threshold = 0.9;
        let engine = seeded_engine(&config).await;
        assert!(engine
            .get_dynamic_context("I can't focus on my assignment", 3)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_returns_empty() {
        let config = TetherConfig::default();
        let store = Arc::new(MemoryStore::new(
            UserId::parse("u1").unwrap(),
            Arc::new(BoxVectorIndex::new(InMemoryIndex::new())),
            &config,
        ));
        let embedder = HashingEmbedder::new(TEST_DIM);
        embedder.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        let engine = RetrievalEngine::new(store, Arc::new(BoxEmbeddingProvider::new(embedder)), &config);

        assert!(engine.get_dynamic_context("I can't focus at all", 3).await.is_empty());
    }
}
