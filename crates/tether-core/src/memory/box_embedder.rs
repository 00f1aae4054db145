//! BoxEmbeddingProvider -- object-safe dynamic dispatch wrapper for EmbeddingProvider.
//!
//! Same blanket-impl pattern as the other `Box*` ports:
//! 1. Define an object-safe `EmbeddingProviderDyn` trait with boxed futures
//! 2. Blanket-impl `EmbeddingProviderDyn` for all `T: EmbeddingProvider`
//! 3. `BoxEmbeddingProvider` wraps `Box<dyn EmbeddingProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use tether_types::error::EmbeddingError;

use super::embedder::EmbeddingProvider;

/// Object-safe version of [`EmbeddingProvider`] with boxed futures.
pub trait EmbeddingProviderDyn: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, EmbeddingError>> + Send + 'a>>;

    fn model_name_dyn(&self) -> &str;

    fn dimension_dyn(&self) -> usize;
}

/// Blanket implementation: any `EmbeddingProvider` automatically implements `EmbeddingProviderDyn`.
impl<T: EmbeddingProvider> EmbeddingProviderDyn for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, EmbeddingError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn model_name_dyn(&self) -> &str {
        self.model_name()
    }

    fn dimension_dyn(&self) -> usize {
        self.dimension()
    }
}

/// Type-erased embedding provider for runtime selection (fastembed or Gemini).
///
/// Since `EmbeddingProvider` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxEmbeddingProvider` provides equivalent methods that delegate
/// to the inner `EmbeddingProviderDyn` trait object.
pub struct BoxEmbeddingProvider {
    inner: Box<dyn EmbeddingProviderDyn + Send + Sync>,
}

impl BoxEmbeddingProvider {
    /// Wrap a concrete `EmbeddingProvider` in a type-erased box.
    pub fn new<T: EmbeddingProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.inner.embed_boxed(text).await
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name_dyn()
    }

    pub fn dimension(&self) -> usize {
        self.inner.dimension_dyn()
    }
}
