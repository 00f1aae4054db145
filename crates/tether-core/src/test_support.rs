//! Shared test doubles for the port traits.
//!
//! `InMemoryIndex` mimics the LanceDB index closely enough for store and
//! session tests: per-user partitions, expiry filtering on every read,
//! cosine KNN ascending by distance. `HashingEmbedder` is a deterministic
//! bag-of-words embedder so semantic scenarios are reproducible.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use tether_types::error::{EmbeddingError, IndexError, SummarizeError};
use tether_types::memory::{
    InterventionRecord, KnnHit, OutcomeFilter, RecordKind, ReflectionRecord, UserId,
};

use crate::memory::embedder::EmbeddingProvider;
use crate::memory::vector::{IndexStatus, VectorIndex};
use crate::reflection::summarizer::SummarizationProvider;

pub const TEST_DIM: usize = 384;

#[derive(Default)]
struct Partition {
    index_created: bool,
    interventions: Vec<InterventionRecord>,
    reflections: Vec<ReflectionRecord>,
}

#[derive(Default)]
pub struct InMemoryIndex {
    partitions: Mutex<HashMap<String, Partition>>,
    pub write_delay: Option<Duration>,
    pub fail_queries: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_creates: AtomicBool,
    pub knn_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_delay(delay: Duration) -> Self {
        Self {
            write_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn knn_calls(&self) -> usize {
        self.knn_calls.load(Ordering::SeqCst)
    }

    fn check_writes(&self) -> Result<(), IndexError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IndexError::Connection("connection refused".to_string()));
        }
        Ok(())
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na * nb)
}

impl VectorIndex for InMemoryIndex {
    async fn ping(&self) -> Result<(), IndexError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(IndexError::Connection("unreachable".to_string()));
        }
        Ok(())
    }

    async fn create_index(&self, user_id: &UserId) -> Result<IndexStatus, IndexError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(IndexError::Query("permission denied".to_string()));
        }
        let mut partitions = self.partitions.lock().unwrap();
        let partition = partitions.entry(user_id.to_string()).or_default();
        if partition.index_created {
            Ok(IndexStatus::AlreadyExists)
        } else {
            partition.index_created = true;
            Ok(IndexStatus::Created)
        }
    }

    async fn index_exists(&self, user_id: &UserId) -> Result<bool, IndexError> {
        let partitions = self.partitions.lock().unwrap();
        Ok(partitions
            .get(user_id.as_str())
            .is_some_and(|p| p.index_created))
    }

    async fn insert_intervention(&self, record: &InterventionRecord) -> Result<(), IndexError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_writes()?;
        let mut partitions = self.partitions.lock().unwrap();
        partitions
            .entry(record.key.user_id.to_string())
            .or_default()
            .interventions
            .push(record.clone());
        Ok(())
    }

    async fn knn_query(
        &self,
        user_id: &UserId,
        vector: &[f32],
        k: usize,
        filter: &OutcomeFilter,
    ) -> Result<Vec<KnnHit>, IndexError> {
        self.knn_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(IndexError::Query("index offline".to_string()));
        }
        let now = Utc::now();
        let partitions = self.partitions.lock().unwrap();
        let Some(partition) = partitions.get(user_id.as_str()) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<KnnHit> = partition
            .interventions
            .iter()
            .filter(|r| r.expires_at > now && filter.matches(&r.outcome))
            .map(|r| KnnHit {
                key: r.key.clone(),
                intervention_text: r.intervention_text.clone(),
                context: r.context.clone(),
                task: r.task.clone(),
                outcome: r.outcome.clone(),
                distance: cosine_distance(vector, &r.embedding),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn insert_reflection(&self, record: &ReflectionRecord) -> Result<(), IndexError> {
        self.check_writes()?;
        let mut partitions = self.partitions.lock().unwrap();
        partitions
            .entry(record.key.user_id.to_string())
            .or_default()
            .reflections
            .push(record.clone());
        Ok(())
    }

    async fn recent_reflections(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<ReflectionRecord>, IndexError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(IndexError::Query("index offline".to_string()));
        }
        let now = Utc::now();
        let partitions = self.partitions.lock().unwrap();
        let mut out: Vec<ReflectionRecord> = partitions
            .get(user_id.as_str())
            .map(|p| {
                p.reflections
                    .iter()
                    .filter(|r| r.expires_at > now)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| b.key.timestamp_ms.cmp(&a.key.timestamp_ms));
        out.truncate(limit);
        Ok(out)
    }

    async fn count(&self, user_id: &UserId, kind: RecordKind) -> Result<u64, IndexError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(IndexError::Query("index offline".to_string()));
        }
        let now = Utc::now();
        let partitions = self.partitions.lock().unwrap();
        let Some(p) = partitions.get(user_id.as_str()) else {
            return Ok(0);
        };
        let n = match kind {
            RecordKind::Intervention => {
                p.interventions.iter().filter(|r| r.expires_at > now).count()
            }
            RecordKind::Reflection => p.reflections.iter().filter(|r| r.expires_at > now).count(),
        };
        Ok(n as u64)
    }

    async fn purge_expired(&self, user_id: &UserId) -> Result<u64, IndexError> {
        let now = Utc::now();
        let mut partitions = self.partitions.lock().unwrap();
        let Some(p) = partitions.get_mut(user_id.as_str()) else {
            return Ok(0);
        };
        let before = p.interventions.len() + p.reflections.len();
        p.interventions.retain(|r| r.expires_at > now);
        p.reflections.retain(|r| r.expires_at > now);
        Ok((before - p.interventions.len() - p.reflections.len()) as u64)
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<u64, IndexError> {
        let mut partitions = self.partitions.lock().unwrap();
        Ok(partitions
            .remove(user_id.as_str())
            .map(|p| (p.interventions.len() + p.reflections.len()) as u64)
            .unwrap_or(0))
    }
}

/// Shared handle so a test can keep inspecting the index it handed to a store.
impl VectorIndex for Arc<InMemoryIndex> {
    async fn ping(&self) -> Result<(), IndexError> {
        self.as_ref().ping().await
    }

    async fn create_index(&self, user_id: &UserId) -> Result<IndexStatus, IndexError> {
        self.as_ref().create_index(user_id).await
    }

    async fn index_exists(&self, user_id: &UserId) -> Result<bool, IndexError> {
        self.as_ref().index_exists(user_id).await
    }

    async fn insert_intervention(&self, record: &InterventionRecord) -> Result<(), IndexError> {
        self.as_ref().insert_intervention(record).await
    }

    async fn knn_query(
        &self,
        user_id: &UserId,
        vector: &[f32],
        k: usize,
        filter: &OutcomeFilter,
    ) -> Result<Vec<KnnHit>, IndexError> {
        self.as_ref().knn_query(user_id, vector, k, filter).await
    }

    async fn insert_reflection(&self, record: &ReflectionRecord) -> Result<(), IndexError> {
        self.as_ref().insert_reflection(record).await
    }

    async fn recent_reflections(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<ReflectionRecord>, IndexError> {
        self.as_ref().recent_reflections(user_id, limit).await
    }

    async fn count(&self, user_id: &UserId, kind: RecordKind) -> Result<u64, IndexError> {
        self.as_ref().count(user_id, kind).await
    }

    async fn purge_expired(&self, user_id: &UserId) -> Result<u64, IndexError> {
        self.as_ref().purge_expired(user_id).await
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<u64, IndexError> {
        self.as_ref().delete_user(user_id).await
    }
}

/// Deterministic bag-of-words embedder.
///
/// Tokens are lowercased runs of alphanumerics and apostrophes, hashed
/// (FNV-1a) into buckets, then L2-normalized.
pub struct HashingEmbedder {
    pub dim: usize,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|t| !t.is_empty())
        {
            v[(fnv1a(token) % self.dim as u64) as usize] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}

impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::AuthenticationFailed);
        }
        Ok(self.vector(text))
    }

    fn model_name(&self) -> &str {
        "hashing-bow"
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// Summarizer returning a canned response (or a canned failure).
pub struct MockSummarizer {
    pub response: Result<String, SummarizeError>,
    pub delay: Option<Duration>,
    pub prompts: Mutex<Vec<String>>,
}

impl MockSummarizer {
    pub fn ok(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: SummarizeError) -> Self {
        Self {
            response: Err(err),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl SummarizationProvider for MockSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String, SummarizeError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }

    fn model_name(&self) -> &str {
        "mock-summarizer"
    }
}

/// Shared handle so a test can read back the prompts it was sent.
impl SummarizationProvider for Arc<MockSummarizer> {
    async fn summarize(&self, prompt: &str) -> Result<String, SummarizeError> {
        self.as_ref().summarize(prompt).await
    }

    fn model_name(&self) -> &str {
        self.as_ref().model_name()
    }
}
