//! Per-user memory store.
//!
//! `MemoryStore` wraps a [`BoxVectorIndex`] for one user partition. It owns
//! validation, key issuance, TTL stamping, timeouts and retries. Writes
//! fail loudly; reads degrade to empty results with a logged warning so a
//! live session never stalls on memory.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tether_types::config::{MemoryConfig, TetherConfig, TimeoutConfig};
use tether_types::error::{IndexError, MemoryError};
use tether_types::memory::{
    InterventionRecord, NewIntervention, OutcomeFilter, RecordKey, RecordKind, ReflectionRecord,
    SimilarIntervention, UserId, UserMemoryStats,
};

use super::box_vector::BoxVectorIndex;
use super::clock::KeyClock;
use super::validate::{truncate_chars, validate_embedding, validate_insight, validate_intervention};
use super::vector::IndexStatus;
use crate::retry::RetryPolicy;

/// Reflections shown in the static prompt context.
const PROMPT_REFLECTIONS: usize = 3;

/// Returned by [`MemoryStore::get_context_for_prompt`] when nothing is stored.
pub const NEW_USER_CONTEXT: &str = "New user - no history yet.";

/// Run an index call under a time budget, mapping elapsed to `IndexError::Timeout`.
pub(crate) async fn bounded<T>(
    budget: Duration,
    fut: impl Future<Output = Result<T, IndexError>>,
) -> Result<T, IndexError> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(IndexError::Timeout(budget.as_millis() as u64)),
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Memory operations scoped to a single user.
pub struct MemoryStore {
    user_id: UserId,
    index: Arc<BoxVectorIndex>,
    memory: MemoryConfig,
    timeouts: TimeoutConfig,
    retry: RetryPolicy,
    clock: Arc<KeyClock>,
    index_ready: AtomicBool,
    index_checked: AtomicBool,
}

impl MemoryStore {
    pub fn new(user_id: UserId, index: Arc<BoxVectorIndex>, config: &TetherConfig) -> Self {
        Self {
            user_id,
            index,
            memory: config.memory.clone(),
            timeouts: config.timeouts.clone(),
            retry: RetryPolicy::from_config(&config.retry),
            clock: Arc::new(KeyClock::new()),
            index_ready: AtomicBool::new(false),
            index_checked: AtomicBool::new(false),
        }
    }

    /// Share a key clock with other stores writing to the same partition.
    pub fn with_clock(mut self, clock: Arc<KeyClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn dimension(&self) -> usize {
        self.memory.dimension
    }

    /// Whether semantic retrieval is currently usable.
    pub fn is_retrieval_available(&self) -> bool {
        self.index_ready.load(Ordering::Acquire)
    }

    /// Create the user's semantic index if needed.
    ///
    /// "Already exists" counts as success. Any other failure is logged and
    /// leaves retrieval unavailable; writes are unaffected.
    #[tracing::instrument(name = "memory.ensure_index", skip(self), fields(user_id = %self.user_id))]
    pub async fn ensure_index(&self) -> bool {
        self.index_checked.store(true, Ordering::Release);
        let result = self
            .retry
            .run("create_index", || {
                bounded(self.timeouts.query(), self.index.create_index(&self.user_id))
            })
            .await;

        match result {
            Ok(IndexStatus::Created) => {
                tracing::info!("created semantic index");
                self.index_ready.store(true, Ordering::Release);
                true
            }
            Ok(IndexStatus::AlreadyExists) => {
                tracing::debug!("semantic index already exists");
                self.index_ready.store(true, Ordering::Release);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not create semantic index, retrieval unavailable");
                self.index_ready.store(false, Ordering::Release);
                false
            }
        }
    }

    /// Validate and persist one intervention. Returns the new record's key.
    ///
    /// Validation failures are returned before any storage call. Connection
    /// and timeout errors are retried with backoff, then returned.
    #[tracing::instrument(
        name = "memory.record_intervention",
        skip(self, input),
        fields(user_id = %self.user_id, outcome = %input.outcome)
    )]
    pub async fn record_intervention(
        &self,
        input: NewIntervention,
    ) -> Result<RecordKey, MemoryError> {
        validate_intervention(&input, self.memory.dimension)?;
        if !input.outcome.is_known() {
            tracing::warn!(outcome = %input.outcome, "recording intervention with unknown outcome label");
        }

        let key = RecordKey::new(
            self.user_id.clone(),
            RecordKind::Intervention,
            self.clock.next(),
        );
        let created_at = Utc::now();
        let record = InterventionRecord {
            key: key.clone(),
            intervention_text: input.intervention_text,
            context: input.context,
            task: input.task,
            outcome: input.outcome,
            embedding: input.embedding,
            created_at,
            expires_at: expiry(created_at, self.memory.intervention_ttl()),
        };

        self.retry
            .run("insert_intervention", || {
                bounded(self.timeouts.write(), self.index.insert_intervention(&record))
            })
            .await?;

        tracing::debug!(key = %key, "intervention stored");
        Ok(key)
    }

    /// K nearest past interventions, most similar first.
    ///
    /// Never fails: an invalid query, an unavailable index or a query error
    /// all yield an empty list. A store that has not tried [`Self::ensure_index`]
    /// yet tries it once first.
    #[tracing::instrument(name = "memory.find_similar", skip(self, query_embedding), fields(user_id = %self.user_id))]
    pub async fn find_similar(
        &self,
        query_embedding: &[f32],
        k: usize,
        successful_only: bool,
    ) -> Vec<SimilarIntervention> {
        if k == 0 {
            return Vec::new();
        }
        if let Err(e) = validate_embedding(query_embedding, self.memory.dimension) {
            tracing::warn!(error = %e, "rejecting similarity query");
            return Vec::new();
        }
        if !self.is_retrieval_available() && !self.index_checked.load(Ordering::Acquire) {
            self.ensure_index().await;
        }
        if !self.is_retrieval_available() {
            tracing::debug!("semantic index unavailable, skipping similarity query");
            return Vec::new();
        }

        let filter = if successful_only {
            OutcomeFilter::successful()
        } else {
            OutcomeFilter::Any
        };

        let hits = match self
            .retry
            .run("knn_query", || {
                bounded(
                    self.timeouts.query(),
                    self.index.knn_query(&self.user_id, query_embedding, k, &filter),
                )
            })
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "similarity query failed");
                return Vec::new();
            }
        };

        let mut results: Vec<SimilarIntervention> = hits
            .into_iter()
            .map(SimilarIntervention::from)
            .collect();
        // Stable: equal distances keep index order.
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);
        results
    }

    /// Persist an end-of-session insight. Failures are logged, not raised.
    #[tracing::instrument(name = "memory.store_reflection", skip(self, insight, session_summary), fields(user_id = %self.user_id))]
    pub async fn store_reflection(&self, insight: &str, session_summary: &str) -> Option<RecordKey> {
        if let Err(e) = validate_insight(insight) {
            tracing::warn!(error = %e, "not storing reflection");
            return None;
        }

        let key = RecordKey::new(
            self.user_id.clone(),
            RecordKind::Reflection,
            self.clock.next(),
        );
        let created_at = Utc::now();
        let record = ReflectionRecord {
            key: key.clone(),
            insight: insight.trim().to_string(),
            session_summary: truncate_chars(session_summary, self.memory.summary_max_chars),
            created_at,
            expires_at: expiry(created_at, self.memory.reflection_ttl()),
        };

        match self
            .retry
            .run("insert_reflection", || {
                bounded(self.timeouts.write(), self.index.insert_reflection(&record))
            })
            .await
        {
            Ok(()) => {
                tracing::debug!(key = %key, "reflection stored");
                Some(key)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to store reflection");
                None
            }
        }
    }

    /// Most recent reflections first. Failures yield an empty list.
    pub async fn get_recent_reflections(&self, limit: usize) -> Vec<ReflectionRecord> {
        match bounded(
            self.timeouts.query(),
            self.index.recent_reflections(&self.user_id, limit),
        )
        .await
        {
            Ok(reflections) => reflections,
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "failed to read reflections");
                Vec::new()
            }
        }
    }

    /// Static context block for the start of a session.
    pub async fn get_context_for_prompt(&self) -> String {
        let mut parts = Vec::new();

        let reflections = self.get_recent_reflections(PROMPT_REFLECTIONS).await;
        if !reflections.is_empty() {
            let lines: Vec<String> = reflections
                .iter()
                .map(|r| format!("- {}", r.insight))
                .collect();
            parts.push(format!(
                "## Key insights from past sessions:\n{}",
                lines.join("\n")
            ));
        }

        match bounded(
            self.timeouts.query(),
            self.index.count(&self.user_id, RecordKind::Intervention),
        )
        .await
        {
            Ok(count) if count > 0 => {
                parts.push(format!(
                    "## Memory status:\n- {count} past interventions stored"
                ));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "failed to count interventions");
            }
        }

        if parts.is_empty() {
            NEW_USER_CONTEXT.to_string()
        } else {
            parts.join("\n\n")
        }
    }

    /// Counts of live records. Reports zeros on failure.
    pub async fn get_stats(&self) -> UserMemoryStats {
        let counts = async {
            let interventions = bounded(
                self.timeouts.query(),
                self.index.count(&self.user_id, RecordKind::Intervention),
            )
            .await?;
            let reflections = bounded(
                self.timeouts.query(),
                self.index.count(&self.user_id, RecordKind::Reflection),
            )
            .await?;
            Ok::<_, IndexError>(UserMemoryStats {
                interventions,
                reflections,
            })
        };

        match counts.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "failed to read stats");
                UserMemoryStats::default()
            }
        }
    }

    /// Delete every record of this user. Returns the number removed.
    #[tracing::instrument(name = "memory.purge_user_data", skip(self), fields(user_id = %self.user_id))]
    pub async fn purge_user_data(&self) -> Result<u64, MemoryError> {
        let removed = self
            .retry
            .run("delete_user", || {
                bounded(self.timeouts.write(), self.index.delete_user(&self.user_id))
            })
            .await?;
        self.index_ready.store(false, Ordering::Release);
        self.index_checked.store(false, Ordering::Release);
        tracing::info!(removed, "purged user data");
        Ok(removed)
    }

    /// Physically remove records past their TTL. Returns the number removed.
    #[tracing::instrument(name = "memory.purge_expired", skip(self), fields(user_id = %self.user_id))]
    pub async fn purge_expired(&self) -> Result<u64, MemoryError> {
        let removed = self
            .retry
            .run("purge_expired", || {
                bounded(self.timeouts.write(), self.index.purge_expired(&self.user_id))
            })
            .await?;
        tracing::debug!(removed, "compacted expired records");
        Ok(removed)
    }
}
