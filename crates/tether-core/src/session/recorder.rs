//! Fire-and-forget intervention recording.
//!
//! The caller builds the record text synchronously and returns as soon as
//! the write is queued; embedding and storage happen on the session's
//! background queue. Failures never reach the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tether_types::config::TetherConfig;
use tether_types::memory::{NewIntervention, Outcome};

use crate::memory::box_embedder::BoxEmbeddingProvider;
use crate::memory::store::MemoryStore;
use crate::memory::validate::{MAX_CONTEXT_CHARS, MAX_INTERVENTION_CHARS, truncate_chars};
use crate::retrieval::embed_bounded;
use crate::retry::RetryPolicy;
use crate::session::state::GENERAL_TASK;
use crate::worker::{BackgroundQueue, SubmitError};

/// One tool invocation worth remembering.
#[derive(Debug, Clone)]
pub struct InterventionEvent {
    pub tool_name: String,
    pub result: String,
    pub outcome: Outcome,
    /// Most recent thing the user said, if anything was captured as text.
    pub user_utterance: Option<String>,
    pub task: Option<String>,
}

impl InterventionEvent {
    pub fn context_text(&self) -> String {
        let context = match self.user_utterance.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => format!("User requested {}", self.tool_name),
        };
        truncate_chars(&context, MAX_CONTEXT_CHARS)
    }

    pub fn intervention_text(&self) -> String {
        truncate_chars(
            &format!("{}: {}", self.tool_name, self.result),
            MAX_INTERVENTION_CHARS,
        )
    }

    pub fn task_label(&self) -> String {
        match self.task.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => GENERAL_TASK.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub queued: u64,
    /// Refused by a full or closed queue.
    pub dropped: u64,
    pub written: u64,
    pub failed: u64,
}

pub struct InterventionRecorder {
    store: Arc<MemoryStore>,
    embedder: Arc<BoxEmbeddingProvider>,
    queue: Arc<BackgroundQueue>,
    embed_timeout: Duration,
    retry: RetryPolicy,
    counters: Arc<Counters>,
}

impl InterventionRecorder {
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: Arc<BoxEmbeddingProvider>,
        queue: Arc<BackgroundQueue>,
        config: &TetherConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            queue,
            embed_timeout: config.timeouts.embed(),
            retry: RetryPolicy::from_config(&config.retry),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Queue one intervention for storage and return immediately.
    pub fn record(&self, event: InterventionEvent) -> Result<(), SubmitError> {
        let context = event.context_text();
        let intervention_text = event.intervention_text();
        let task = event.task_label();
        let outcome = event.outcome;

        let store = self.store.clone();
        let embedder = self.embedder.clone();
        let embed_timeout = self.embed_timeout;
        let retry = self.retry.clone();
        let counters = self.counters.clone();
        let tool = event.tool_name;

        let submitted = self.queue.submit(async move {
            let embedding = match embed_bounded(&embedder, &context, embed_timeout, &retry).await {
                Ok(v) => v,
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(user_id = %store.user_id(), tool = %tool, error = %e, "intervention not recorded: embedding failed");
                    return;
                }
            };
            let input = NewIntervention {
                intervention_text,
                context,
                task,
                outcome,
                embedding,
            };
            match store.record_intervention(input).await {
                Ok(key) => {
                    counters.written.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, tool = %tool, "intervention recorded");
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(user_id = %store.user_id(), tool = %tool, error = %e, "intervention not recorded");
                }
            }
        });

        match submitted {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}
