//! End-of-session reflection.
//!
//! `ReflectionGenerator` condenses a finished session into one short,
//! actionable insight about the user and persists it. It never fails: any
//! summarization problem falls back to [`DEFAULT_INSIGHT`], which is stored
//! like a real insight.

use std::sync::Arc;
use std::time::Duration;

use tether_types::config::TetherConfig;
use tether_types::error::SummarizeError;
use tether_types::memory::RecordKey;
use tether_types::session::TranscriptMessage;

use super::box_summarizer::BoxSummarizationProvider;
use crate::memory::store::MemoryStore;
use crate::retry::RetryPolicy;

pub const DEFAULT_INSIGHT: &str =
    "Session completed. Continue monitoring user patterns and preferences.";

/// Messages of the transcript included in the prompt.
pub const TRANSCRIPT_WINDOW: usize = 20;

/// Prior insights included in the prompt.
pub const PRIOR_INSIGHTS: usize = 3;

/// Result of a reflection run.
#[derive(Debug, Clone)]
pub struct Reflection {
    pub insight: String,
    /// True when the summarizer failed and the default insight was used.
    pub is_default: bool,
    /// Key of the stored record, if the write succeeded.
    pub key: Option<RecordKey>,
}

/// Format the tail of a transcript as `ROLE: content` lines.
pub fn format_transcript(transcript: &[TranscriptMessage]) -> String {
    let start = transcript.len().saturating_sub(TRANSCRIPT_WINDOW);
    transcript[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role.to_string().to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the reflection prompt.
pub fn build_prompt(transcript_text: &str, previous: &[String]) -> String {
    let previous_text = if previous.is_empty() {
        "None yet".to_string()
    } else {
        previous
            .iter()
            .map(|i| format!("- {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Analyze this support session for someone with ADHD or emotional-regulation difficulties.\n\
         \n\
         SESSION TRANSCRIPT:\n\
         {transcript_text}\n\
         \n\
         PREVIOUS INSIGHTS ABOUT THIS USER:\n\
         {previous_text}\n\
         \n\
         Generate ONE brief insight (1-2 sentences) about what we learned from this session.\n\
         Focus on:\n\
         - What intervention styles worked or didn't work\n\
         - User's preferences or patterns you noticed\n\
         - What to do differently next time\n\
         \n\
         Keep it specific and actionable."
    )
}

pub struct ReflectionGenerator {
    summarizer: Arc<BoxSummarizationProvider>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ReflectionGenerator {
    pub fn new(summarizer: Arc<BoxSummarizationProvider>, config: &TetherConfig) -> Self {
        Self {
            summarizer,
            timeout: config.timeouts.summarize(),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    async fn summarize(&self, prompt: &str) -> Result<String, SummarizeError> {
        let text = self
            .retry
            .run("summarize", || async {
                match tokio::time::timeout(self.timeout, self.summarizer.summarize(prompt)).await {
                    Ok(result) => result,
                    Err(_) => Err(SummarizeError::Timeout(self.timeout.as_millis() as u64)),
                }
            })
            .await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SummarizeError::Empty);
        }
        Ok(text.to_string())
    }

    /// Generate and persist one insight for the finished session.
    #[tracing::instrument(
        name = "reflection.generate",
        skip(self, store, transcript),
        fields(
            user_id = %store.user_id(),
            model = %self.summarizer.model_name(),
            messages = transcript.len(),
        )
    )]
    pub async fn generate(
        &self,
        store: &MemoryStore,
        transcript: &[TranscriptMessage],
    ) -> Reflection {
        let transcript_text = format_transcript(transcript);
        let previous: Vec<String> = store
            .get_recent_reflections(PRIOR_INSIGHTS)
            .await
            .into_iter()
            .map(|r| r.insight)
            .collect();
        let prompt = build_prompt(&transcript_text, &previous);

        let (insight, is_default) = match self.summarize(&prompt).await {
            Ok(text) => (text, false),
            Err(e) => {
                tracing::warn!(error = %e, "reflection summarization failed, using default insight");
                (DEFAULT_INSIGHT.to_string(), true)
            }
        };

        let key = store.store_reflection(&insight, &transcript_text).await;
        Reflection {
            insight,
            is_default,
            key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::box_vector::BoxVectorIndex;
    use crate::test_support::{InMemoryIndex, MockSummarizer};
    use tether_types::memory::UserId;

    fn store(config: &TetherConfig) -> MemoryStore {
        MemoryStore::new(
            UserId::parse("reflect_user").unwrap(),
            Arc::new(BoxVectorIndex::new(InMemoryIndex::new())),
            config,
        )
    }

    fn transcript(n: usize) -> Vec<TranscriptMessage> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    TranscriptMessage::user(format!("user says {i}"))
                } else {
                    TranscriptMessage::assistant(format!("assistant says {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn test_format_transcript_keeps_last_twenty() {
        let text = format_transcript(&transcript(25));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 20);
        assert_eq!(lines[0], "ASSISTANT: assistant says 5");
        assert_eq!(lines[19], "USER: user says 24");
    }

    #[test]
    fn test_build_prompt_without_prior_insights() {
        let prompt = build_prompt("USER: hi", &[]);
        assert!(prompt.contains("SESSION TRANSCRIPT:\nUSER: hi"));
        assert!(prompt.contains("PREVIOUS INSIGHTS ABOUT THIS USER:\nNone yet"));
    }

    #[tokio::test]
    async fn test_generate_stores_summarizer_insight() {
        let config = TetherConfig::default();
        let store = store(&config);
        store.store_reflection("Prefers short steps", "earlier").await.unwrap();

        let summarizer = MockSummarizer::ok("  Body doubling helped start the essay.  ");
        let generator = ReflectionGenerator::new(
            Arc::new(BoxSummarizationProvider::new(summarizer)),
            &config,
        );
        let reflection = generator.generate(&store, &transcript(4)).await;

        assert!(!reflection.is_default);
        assert_eq!(reflection.insight, "Body doubling helped start the essay.");
        assert!(reflection.key.is_some());

        let recent = store.get_recent_reflections(1).await;
        assert_eq!(recent[0].insight, "Body doubling helped start the essay.");
        assert!(recent[0].session_summary.starts_with("USER: user says 0"));
    }

    #[tokio::test]
    async fn test_prompt_carries_latest_insights_and_transcript_tail() {
        let config = TetherConfig::default();
        let store = store(&config);
        for i in 0..5 {
            store
                .store_reflection(&format!("Prefers short steps {i}"), "earlier")
                .await
                .unwrap();
        }

        let summarizer = Arc::new(MockSummarizer::ok("ok"));
        let generator = ReflectionGenerator::new(
            Arc::new(BoxSummarizationProvider::new(summarizer.clone())),
            &config,
        );
        generator.generate(&store, &transcript(25)).await;

        let prompts = summarizer.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];

        let insights: Vec<&str> = prompt
            .lines()
            .filter(|l| l.starts_with("- Prefers short steps"))
            .collect();
        assert_eq!(
            insights,
            vec![
                "- Prefers short steps 4",
                "- Prefers short steps 3",
                "- Prefers short steps 2",
            ]
        );

        let transcript_lines = prompt
            .lines()
            .filter(|l| l.starts_with("USER: ") || l.starts_with("ASSISTANT: "))
            .count();
        assert_eq!(transcript_lines, TRANSCRIPT_WINDOW);
        assert!(prompt.contains("ASSISTANT: assistant says 5\n"));
        assert!(!prompt.contains("USER: user says 4\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_summarizer_failure_stores_default_insight() {
        let config = TetherConfig::default();
        let store = store(&config);
        let generator = ReflectionGenerator::new(
            Arc::new(BoxSummarizationProvider::new(MockSummarizer::failing(
                SummarizeError::Provider {
                    message: "503".to_string(),
                },
            ))),
            &config,
        );

        let reflection = generator.generate(&store, &transcript(3)).await;
        assert!(reflection.is_default);
        assert_eq!(reflection.insight, DEFAULT_INSIGHT);
        assert_eq!(store.get_stats().await.reflections, 1);
    }

    #[tokio::test]
    async fn test_empty_summary_uses_default() {
        let config = TetherConfig::default();
        let store = store(&config);
        let generator = ReflectionGenerator::new(
            Arc::new(BoxSummarizationProvider::new(MockSummarizer::ok("   "))),
            &config,
        );

        let reflection = generator.generate(&store, &[]).await;
        assert_eq!(reflection.insight, DEFAULT_INSIGHT);
        assert_eq!(store.get_stats().await.reflections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_summarizer_timeout_uses_default() {
        let mut config = TetherConfig::default();
        config.timeouts.summarize_ms = 100;
        config.retry.max_attempts = 1;
        let store = store(&config);
        let mut slow = MockSummarizer::ok("too late");
        slow.delay = Some(Duration::from_secs(5));
        let generator =
            ReflectionGenerator::new(Arc::new(BoxSummarizationProvider::new(slow)), &config);

        let reflection = generator.generate(&store, &transcript(2)).await;
        assert!(reflection.is_default);
        assert_eq!(store.get_stats().await.reflections, 1);
    }
}
