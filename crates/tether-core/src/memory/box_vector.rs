//! BoxVectorIndex -- object-safe dynamic dispatch wrapper for VectorIndex.
//!
//! Same blanket-impl pattern as BoxEmbeddingProvider:
//! 1. Define an object-safe `VectorIndexDyn` trait with boxed futures
//! 2. Blanket-impl `VectorIndexDyn` for all `T: VectorIndex`
//! 3. `BoxVectorIndex` wraps `Box<dyn VectorIndexDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use tether_types::error::IndexError;
use tether_types::memory::{
    InterventionRecord, KnnHit, OutcomeFilter, RecordKind, ReflectionRecord, UserId,
};

use super::vector::{IndexStatus, VectorIndex};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, IndexError>> + Send + 'a>>;

/// Object-safe version of [`VectorIndex`] with boxed futures.
pub trait VectorIndexDyn: Send + Sync {
    fn ping_boxed(&self) -> BoxFuture<'_, ()>;

    fn create_index_boxed<'a>(&'a self, user_id: &'a UserId) -> BoxFuture<'a, IndexStatus>;

    fn index_exists_boxed<'a>(&'a self, user_id: &'a UserId) -> BoxFuture<'a, bool>;

    fn insert_intervention_boxed<'a>(
        &'a self,
        record: &'a InterventionRecord,
    ) -> BoxFuture<'a, ()>;

    fn knn_query_boxed<'a>(
        &'a self,
        user_id: &'a UserId,
        vector: &'a [f32],
        k: usize,
        filter: &'a OutcomeFilter,
    ) -> BoxFuture<'a, Vec<KnnHit>>;

    fn insert_reflection_boxed<'a>(&'a self, record: &'a ReflectionRecord) -> BoxFuture<'a, ()>;

    fn recent_reflections_boxed<'a>(
        &'a self,
        user_id: &'a UserId,
        limit: usize,
    ) -> BoxFuture<'a, Vec<ReflectionRecord>>;

    fn count_boxed<'a>(&'a self, user_id: &'a UserId, kind: RecordKind) -> BoxFuture<'a, u64>;

    fn purge_expired_boxed<'a>(&'a self, user_id: &'a UserId) -> BoxFuture<'a, u64>;

    fn delete_user_boxed<'a>(&'a self, user_id: &'a UserId) -> BoxFuture<'a, u64>;
}

/// Blanket implementation: any `VectorIndex` automatically implements `VectorIndexDyn`.
impl<T: VectorIndex> VectorIndexDyn for T {
    fn ping_boxed(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.ping())
    }

    fn create_index_boxed<'a>(&'a self, user_id: &'a UserId) -> BoxFuture<'a, IndexStatus> {
        Box::pin(self.create_index(user_id))
    }

    fn index_exists_boxed<'a>(&'a self, user_id: &'a UserId) -> BoxFuture<'a, bool> {
        Box::pin(self.index_exists(user_id))
    }

    fn insert_intervention_boxed<'a>(
        &'a self,
        record: &'a InterventionRecord,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.insert_intervention(record))
    }

    fn knn_query_boxed<'a>(
        &'a self,
        user_id: &'a UserId,
        vector: &'a [f32],
        k: usize,
        filter: &'a OutcomeFilter,
    ) -> BoxFuture<'a, Vec<KnnHit>> {
        Box::pin(self.knn_query(user_id, vector, k, filter))
    }

    fn insert_reflection_boxed<'a>(&'a self, record: &'a ReflectionRecord) -> BoxFuture<'a, ()> {
        Box::pin(self.insert_reflection(record))
    }

    fn recent_reflections_boxed<'a>(
        &'a self,
        user_id: &'a UserId,
        limit: usize,
    ) -> BoxFuture<'a, Vec<ReflectionRecord>> {
        Box::pin(self.recent_reflections(user_id, limit))
    }

    fn count_boxed<'a>(&'a self, user_id: &'a UserId, kind: RecordKind) -> BoxFuture<'a, u64> {
        Box::pin(self.count(user_id, kind))
    }

    fn purge_expired_boxed<'a>(&'a self, user_id: &'a UserId) -> BoxFuture<'a, u64> {
        Box::pin(self.purge_expired(user_id))
    }

    fn delete_user_boxed<'a>(&'a self, user_id: &'a UserId) -> BoxFuture<'a, u64> {
        Box::pin(self.delete_user(user_id))
    }
}

/// Type-erased vector index for runtime selection.
///
/// Since `VectorIndex` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxVectorIndex` provides equivalent methods that delegate
/// to the inner `VectorIndexDyn` trait object.
pub struct BoxVectorIndex {
    inner: Box<dyn VectorIndexDyn + Send + Sync>,
}

impl BoxVectorIndex {
    /// Wrap a concrete `VectorIndex` in a type-erased box.
    pub fn new<T: VectorIndex + 'static>(index: T) -> Self {
        Self {
            inner: Box::new(index),
        }
    }

    pub async fn ping(&self) -> Result<(), IndexError> {
        self.inner.ping_boxed().await
    }

    pub async fn create_index(&self, user_id: &UserId) -> Result<IndexStatus, IndexError> {
        self.inner.create_index_boxed(user_id).await
    }

    pub async fn index_exists(&self, user_id: &UserId) -> Result<bool, IndexError> {
        self.inner.index_exists_boxed(user_id).await
    }

    pub async fn insert_intervention(&self, record: &InterventionRecord) -> Result<(), IndexError> {
        self.inner.insert_intervention_boxed(record).await
    }

    pub async fn knn_query(
        &self,
        user_id: &UserId,
        vector: &[f32],
        k: usize,
        filter: &OutcomeFilter,
    ) -> Result<Vec<KnnHit>, IndexError> {
        self.inner.knn_query_boxed(user_id, vector, k, filter).await
    }

    pub async fn insert_reflection(&self, record: &ReflectionRecord) -> Result<(), IndexError> {
        self.inner.insert_reflection_boxed(record).await
    }

    pub async fn recent_reflections(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<ReflectionRecord>, IndexError> {
        self.inner.recent_reflections_boxed(user_id, limit).await
    }

    pub async fn count(&self, user_id: &UserId, kind: RecordKind) -> Result<u64, IndexError> {
        self.inner.count_boxed(user_id, kind).await
    }

    pub async fn purge_expired(&self, user_id: &UserId) -> Result<u64, IndexError> {
        self.inner.purge_expired_boxed(user_id).await
    }

    pub async fn delete_user(&self, user_id: &UserId) -> Result<u64, IndexError> {
        self.inner.delete_user_boxed(user_id).await
    }
}
