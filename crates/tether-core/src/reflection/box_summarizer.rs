//! BoxSummarizationProvider -- object-safe dynamic dispatch wrapper for
//! SummarizationProvider, following the same blanket-impl pattern as
//! BoxEmbeddingProvider.

use std::future::Future;
use std::pin::Pin;

use tether_types::error::SummarizeError;

use super::summarizer::SummarizationProvider;

/// Object-safe version of [`SummarizationProvider`] with boxed futures.
pub trait SummarizationProviderDyn: Send + Sync {
    fn summarize_boxed<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, SummarizeError>> + Send + 'a>>;

    fn model_name_dyn(&self) -> &str;
}

impl<T: SummarizationProvider> SummarizationProviderDyn for T {
    fn summarize_boxed<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, SummarizeError>> + Send + 'a>> {
        Box::pin(self.summarize(prompt))
    }

    fn model_name_dyn(&self) -> &str {
        self.model_name()
    }
}

/// Type-erased summarization provider.
pub struct BoxSummarizationProvider {
    inner: Box<dyn SummarizationProviderDyn + Send + Sync>,
}

impl BoxSummarizationProvider {
    pub fn new<T: SummarizationProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub async fn summarize(&self, prompt: &str) -> Result<String, SummarizeError> {
        self.inner.summarize_boxed(prompt).await
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name_dyn()
    }
}
