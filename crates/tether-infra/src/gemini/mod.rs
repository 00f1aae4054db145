//! Google Gemini REST client.
//!
//! Shared HTTP plumbing for the Gemini embedding and summarization
//! providers. The API key travels in the `x-goog-api-key` header and is
//! wrapped in [`SecretString`] everywhere else.

pub mod embedder;
pub mod summarizer;
pub mod types;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use embedder::GeminiEmbedder;
pub use summarizer::GeminiSummarizer;

/// Failure of one Gemini HTTP call, before mapping into a port error.
#[derive(Debug)]
pub(crate) enum HttpFailure {
    Transport(String),
    Status { code: u16, body: String },
    Decode(String),
}

/// Thin authenticated client for `{base_url}/models/{model}:{method}`.
///
/// Deliberately not `Debug`.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: SecretString, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to create reqwest client");

        Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    pub(crate) async fn post<B, R>(
        &self,
        model: &str,
        method: &str,
        body: &B,
    ) -> Result<R, HttpFailure>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(model, method))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| HttpFailure::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpFailure::Status {
                code: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| HttpFailure::Decode(format!("failed to parse response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_shape() {
        let client = GeminiClient::new(
            SecretString::from("k"),
            "https://generativelanguage.googleapis.com/v1beta/",
        );
        assert_eq!(
            client.url("gemini-2.0-flash", "generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
