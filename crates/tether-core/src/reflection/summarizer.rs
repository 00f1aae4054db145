//! Summarization provider trait.
//!
//! The single text-generation capability the reflection generator needs.
//! The Gemini implementation lives in tether-infra.

use tether_types::error::SummarizeError;

/// Trait for one-shot prompt-to-text generation.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait SummarizationProvider: Send + Sync {
    fn summarize(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<String, SummarizeError>> + Send;

    fn model_name(&self) -> &str;
}
