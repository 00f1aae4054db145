//! Embedding provider trait for text-to-vector conversion.
//!
//! Implementations (local fastembed, Gemini over HTTP) live in tether-infra.

use tether_types::error::EmbeddingError;

/// Trait for converting text into a fixed-dimension embedding vector.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    ///
    /// Must return exactly [`dimension`](Self::dimension) finite values; the
    /// memory store validates the vector regardless.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, EmbeddingError>> + Send;

    /// The model name used for embeddings (e.g., "text-embedding-004").
    fn model_name(&self) -> &str;

    /// The dimensionality of the output vectors.
    fn dimension(&self) -> usize;
}
