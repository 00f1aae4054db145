//! Vector index trait.
//!
//! Defines the storage-engine contract behind the memory store: per-user
//! partitions of intervention and reflection records, a KNN query over
//! intervention embeddings, and TTL enforcement. Implementations (LanceDB)
//! live in tether-infra.

use tether_types::error::IndexError;
use tether_types::memory::{
    InterventionRecord, KnnHit, OutcomeFilter, RecordKind, ReflectionRecord, UserId,
};

/// Outcome of an idempotent index creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Created,
    AlreadyExists,
}

/// Trait for the per-user record store with semantic search.
///
/// Every read must hide records whose `expires_at` has passed, whether or
/// not they have been physically removed yet.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait VectorIndex: Send + Sync {
    /// Check connectivity with the underlying engine.
    fn ping(&self) -> impl std::future::Future<Output = Result<(), IndexError>> + Send;

    /// Create the user's semantic index if it does not exist.
    ///
    /// Safe to call concurrently: exactly one caller observes `Created`.
    fn create_index(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<IndexStatus, IndexError>> + Send;

    /// Whether the user's semantic index exists.
    fn index_exists(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<bool, IndexError>> + Send;

    /// Append one intervention record.
    fn insert_intervention(
        &self,
        record: &InterventionRecord,
    ) -> impl std::future::Future<Output = Result<(), IndexError>> + Send;

    /// K nearest interventions by cosine distance, ascending.
    fn knn_query(
        &self,
        user_id: &UserId,
        vector: &[f32],
        k: usize,
        filter: &OutcomeFilter,
    ) -> impl std::future::Future<Output = Result<Vec<KnnHit>, IndexError>> + Send;

    /// Append one reflection record.
    fn insert_reflection(
        &self,
        record: &ReflectionRecord,
    ) -> impl std::future::Future<Output = Result<(), IndexError>> + Send;

    /// Most recent reflections first, by key timestamp.
    fn recent_reflections(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<ReflectionRecord>, IndexError>> + Send;

    /// Count live (unexpired) records of one kind.
    fn count(
        &self,
        user_id: &UserId,
        kind: RecordKind,
    ) -> impl std::future::Future<Output = Result<u64, IndexError>> + Send;

    /// Physically remove expired records. Returns the number removed.
    fn purge_expired(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<u64, IndexError>> + Send;

    /// Delete every record and index of a user. Returns the number of records removed.
    fn delete_user(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<u64, IndexError>> + Send;
}
