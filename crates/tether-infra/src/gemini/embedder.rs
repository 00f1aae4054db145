//! Gemini `embedContent` embedding provider.

use tether_core::memory::embedder::EmbeddingProvider;
use tether_types::error::EmbeddingError;

use super::types::{Content, EmbedContentRequest, EmbedContentResponse};
use super::{GeminiClient, HttpFailure};
use crate::vector::schema::GEMINI_DIMENSION;

pub struct GeminiEmbedder {
    client: GeminiClient,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(client: GeminiClient, model: String) -> Self {
        Self { client, model }
    }
}

fn map_failure(failure: HttpFailure) -> EmbeddingError {
    match failure {
        HttpFailure::Transport(message) => EmbeddingError::Provider { message },
        HttpFailure::Decode(message) => EmbeddingError::Malformed(message),
        HttpFailure::Status { code, body } => match code {
            401 | 403 => EmbeddingError::AuthenticationFailed,
            429 => EmbeddingError::RateLimited,
            503 | 529 => EmbeddingError::Overloaded(body),
            _ => EmbeddingError::Provider {
                message: format!("HTTP {code}: {body}"),
            },
        },
    }
}

/// Reject vectors of the wrong size or with non-finite components.
fn check_values(values: Vec<f32>, expected: usize) -> Result<Vec<f32>, EmbeddingError> {
    if values.len() != expected {
        return Err(EmbeddingError::Malformed(format!(
            "gemini returned {} values, expected {expected}",
            values.len()
        )));
    }
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(EmbeddingError::Malformed(format!(
            "gemini returned a non-finite value at position {i}"
        )));
    }
    Ok(values)
}

impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content::user_text(text),
            task_type: Some("SEMANTIC_SIMILARITY".to_string()),
        };
        let response: EmbedContentResponse = self
            .client
            .post(&self.model, "embedContent", &body)
            .await
            .map_err(map_failure)?;

        check_values(response.embedding.values, GEMINI_DIMENSION)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        GEMINI_DIMENSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_values_names_provider_fault() {
        assert_eq!(check_values(vec![0.5; 4], 4).unwrap().len(), 4);

        let err = check_values(Vec::new(), GEMINI_DIMENSION).unwrap_err();
        assert!(matches!(&err, EmbeddingError::Malformed(m) if m == "gemini returned 0 values, expected 768"));

        let err = check_values(vec![0.1; 3], 4).unwrap_err();
        assert!(matches!(err, EmbeddingError::Malformed(_)));

        let mut values = vec![0.1; 4];
        values[2] = f32::INFINITY;
        let err = check_values(values, 4).unwrap_err();
        assert!(matches!(&err, EmbeddingError::Malformed(m) if m.contains("position 2")));
    }

    #[test]
    fn test_status_mapping() {
        let status = |code| HttpFailure::Status {
            code,
            body: "busy".to_string(),
        };
        assert!(matches!(map_failure(status(401)), EmbeddingError::AuthenticationFailed));
        assert!(matches!(map_failure(status(429)), EmbeddingError::RateLimited));
        assert!(matches!(map_failure(status(503)), EmbeddingError::Overloaded(b) if b == "busy"));
        assert!(matches!(map_failure(status(500)), EmbeddingError::Provider { .. }));
        assert!(matches!(
            map_failure(HttpFailure::Decode("x".to_string())),
            EmbeddingError::Malformed(_)
        ));
    }
}
