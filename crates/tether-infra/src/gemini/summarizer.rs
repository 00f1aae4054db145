//! Gemini `generateContent` summarization provider.

use tether_core::reflection::summarizer::SummarizationProvider;
use tether_types::error::SummarizeError;

use super::types::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig};
use super::{GeminiClient, HttpFailure};

pub struct GeminiSummarizer {
    client: GeminiClient,
    model: String,
}

impl GeminiSummarizer {
    pub fn new(client: GeminiClient, model: String) -> Self {
        Self { client, model }
    }
}

fn map_failure(failure: HttpFailure) -> SummarizeError {
    match failure {
        HttpFailure::Transport(message) | HttpFailure::Decode(message) => {
            SummarizeError::Provider { message }
        }
        HttpFailure::Status { code, body } => match code {
            401 | 403 => SummarizeError::AuthenticationFailed,
            429 => SummarizeError::RateLimited,
            _ => SummarizeError::Provider {
                message: format!("HTTP {code}: {body}"),
            },
        },
    }
}

impl SummarizationProvider for GeminiSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String, SummarizeError> {
        let body = GenerateContentRequest {
            contents: vec![Content::user_text(prompt)],
            generation_config: Some(GenerationConfig {
                temperature: Some(0.4),
                max_output_tokens: Some(256),
            }),
        };
        let response: GenerateContentResponse = self
            .client
            .post(&self.model, "generateContent", &body)
            .await
            .map_err(map_failure)?;

        match response.first_text() {
            Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(SummarizeError::Empty),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
