//! Configuration types for Tether.
//!
//! `TetherConfig` represents the top-level `config.toml` in the data
//! directory. Every field has a default, so an empty or partial file is
//! valid.

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Top-level configuration.
///
/// Loaded from `~/.tether/config.toml` (or `$TETHER_DATA_DIR/config.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub injection: InjectionPolicy,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
}

/// Record shape and lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Embedding dimension D. Must match the configured embedding provider.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_intervention_ttl_secs")]
    pub intervention_ttl_secs: u64,
    #[serde(default = "default_reflection_ttl_secs")]
    pub reflection_ttl_secs: u64,
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

fn default_dimension() -> usize {
    384
}

fn default_intervention_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_reflection_ttl_secs() -> u64 {
    90 * 24 * 60 * 60
}

fn default_summary_max_chars() -> usize {
    500
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            intervention_ttl_secs: default_intervention_ttl_secs(),
            reflection_ttl_secs: default_reflection_ttl_secs(),
            summary_max_chars: default_summary_max_chars(),
        }
    }
}

impl MemoryConfig {
    pub fn intervention_ttl(&self) -> Duration {
        Duration::from_secs(self.intervention_ttl_secs)
    }

    pub fn reflection_ttl(&self) -> Duration {
        Duration::from_secs(self.reflection_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Top similarity must be strictly greater than this for context to be returned.
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f32,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_acceptance_threshold() -> f32 {
    0.7
}

fn default_k() -> usize {
    3
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: default_acceptance_threshold(),
            k: default_k(),
        }
    }
}

/// How a retrieved context block reaches the live conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionTransport {
    /// Held and prepended to the next outgoing user message.
    #[default]
    PrependToNextMessage,
    /// Sent immediately as its own message marked turn-complete.
    PrimingMessage,
}

/// Turn policy for dynamic context injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionPolicy {
    /// Completed assistant turns to let pass before the first injection attempt.
    #[serde(default = "default_skip_turns")]
    pub skip_turns: u32,
    /// Derived queries shorter than this are skipped.
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
    /// Skip a query identical to the previous attempt.
    #[serde(default = "default_true")]
    pub dedup: bool,
    #[serde(default)]
    pub transport: InjectionTransport,
    /// Words that mark a turn as expressing a need.
    #[serde(default = "default_need_keywords")]
    pub need_keywords: Vec<String>,
    /// Characters of the assistant utterance used as a fallback query.
    #[serde(default = "default_assistant_query_chars")]
    pub assistant_query_chars: usize,
    /// How many of the most recent turns are scanned for need keywords.
    #[serde(default = "default_keyword_window")]
    pub keyword_window: usize,
}

fn default_skip_turns() -> u32 {
    1
}

fn default_min_query_chars() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_need_keywords() -> Vec<String> {
    [
        "focus",
        "overwhelm",
        "task",
        "help",
        "can't",
        "need",
        "stuck",
        "difficult",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_assistant_query_chars() -> usize {
    200
}

fn default_keyword_window() -> usize {
    2
}

impl Default for InjectionPolicy {
    fn default() -> Self {
        Self {
            skip_turns: default_skip_turns(),
            min_query_chars: default_min_query_chars(),
            dedup: true,
            transport: InjectionTransport::default(),
            need_keywords: default_need_keywords(),
            assistant_query_chars: default_assistant_query_chars(),
            keyword_window: default_keyword_window(),
        }
    }
}

/// Per-operation time budgets, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_embed_ms")]
    pub embed_ms: u64,
    #[serde(default = "default_query_ms")]
    pub query_ms: u64,
    #[serde(default = "default_write_ms")]
    pub write_ms: u64,
    #[serde(default = "default_summarize_ms")]
    pub summarize_ms: u64,
    /// How long teardown waits for queued background work before cancelling it.
    #[serde(default = "default_drain_ms")]
    pub drain_ms: u64,
}

fn default_embed_ms() -> u64 {
    2_000
}

fn default_query_ms() -> u64 {
    1_000
}

fn default_write_ms() -> u64 {
    2_000
}

fn default_summarize_ms() -> u64 {
    15_000
}

fn default_drain_ms() -> u64 {
    5_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embed_ms: default_embed_ms(),
            query_ms: default_query_ms(),
            write_ms: default_write_ms(),
            summarize_ms: default_summarize_ms(),
            drain_ms: default_drain_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn embed(&self) -> Duration {
        Duration::from_millis(self.embed_ms)
    }

    pub fn query(&self) -> Duration {
        Duration::from_millis(self.query_ms)
    }

    pub fn write(&self) -> Duration {
        Duration::from_millis(self.write_ms)
    }

    pub fn summarize(&self) -> Duration {
        Duration::from_millis(self.summarize_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }
}

/// Bounded exponential backoff for retryable provider and index errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    2_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_capacity() -> usize {
    64
}

fn default_workers() -> usize {
    2
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            workers: default_workers(),
        }
    }
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// Local BGE-small via fastembed (D = 384).
    #[default]
    Fastembed,
    /// Gemini `text-embedding-004` over HTTP (D = 768).
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub embedding: EmbeddingProviderKind,
    #[serde(default = "default_gemini_embedding_model")]
    pub gemini_embedding_model: String,
    #[serde(default = "default_gemini_summary_model")]
    pub gemini_summary_model: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    /// Environment variable holding the Gemini API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_gemini_embedding_model() -> String {
    "text-embedding-004".to_string()
}

fn default_gemini_summary_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingProviderKind::default(),
            gemini_embedding_model: default_gemini_embedding_model(),
            gemini_summary_model: default_gemini_summary_model(),
            gemini_base_url: default_gemini_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tether_config_default_values() {
        let config = TetherConfig::default();
        assert_eq!(config.memory.dimension, 384);
        assert_eq!(config.memory.intervention_ttl(), Duration::from_secs(2_592_000));
        assert_eq!(config.memory.reflection_ttl(), Duration::from_secs(7_776_000));
        assert!((config.retrieval.acceptance_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.injection.skip_turns, 1);
        assert_eq!(config.injection.min_query_chars, 10);
        assert!(config.injection.dedup);
        assert_eq!(config.injection.need_keywords.len(), 8);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.providers.embedding, EmbeddingProviderKind::Fastembed);
    }

    #[test]
    fn test_tether_config_deserialize_empty() {
        let config: TetherConfig = toml::from_str("").unwrap();
        assert_eq!(config.queue.capacity, 64);
        assert_eq!(config.timeouts.drain(), Duration::from_secs(5));
        assert_eq!(config.providers.gemini_summary_model, "gemini-2.0-flash");
    }

    #[test]
    fn test_tether_config_deserialize_partial_sections() {
        let toml_str = r#"
[memory]
dimension = 768

[retrieval]
acceptance_threshold = 0.8

[injection]
skip_turns = 0
transport = "priming_message"

[providers]
embedding = "gemini"
"#;
        let config: TetherConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.memory.dimension, 768);
        assert_eq!(config.memory.summary_max_chars, 500);
        assert!((config.retrieval.acceptance_threshold - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.k, 3);
        assert_eq!(config.injection.skip_turns, 0);
        assert_eq!(config.injection.transport, InjectionTransport::PrimingMessage);
        assert_eq!(config.injection.min_query_chars, 10);
        assert_eq!(config.providers.embedding, EmbeddingProviderKind::Gemini);
        assert_eq!(config.providers.api_key_env, "GOOGLE_API_KEY");
    }

    #[test]
    fn test_tether_config_rejects_unknown_transport() {
        let result: Result<TetherConfig, _> = toml::from_str("[injection]\ntransport = \"smoke_signal\"");
        assert!(result.is_err());
    }
}
