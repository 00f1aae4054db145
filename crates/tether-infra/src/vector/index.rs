//! LanceDB-backed [`VectorIndex`] for per-user memory.
//!
//! Each user gets an isolated intervention table (the semantic index, with
//! a fixed-size embedding column) and a reflection table. TTL is enforced
//! by filtering every read on `expires_at_ms`; `purge_expired` compacts.

use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};

use tether_core::memory::vector::{IndexStatus, VectorIndex};
use tether_types::error::IndexError;
use tether_types::memory::{
    InterventionRecord, KnnHit, Outcome, OutcomeFilter, RecordKey, RecordKind, ReflectionRecord,
    UserId,
};

use super::lance::{LanceVectorStore, TableStatus};
use super::schema::{interventions_schema, reflections_schema};

fn query_err(context: &str, e: impl std::fmt::Display) -> IndexError {
    IndexError::Query(format!("{context}: {e}"))
}

/// Storage faults are transient and retried upstream; anything else is a bad query.
fn lance_err(context: &str, e: lancedb::Error) -> IndexError {
    match e {
        lancedb::Error::ObjectStore { .. } | lancedb::Error::CreateDir { .. } => {
            IndexError::Connection(format!("{context}: {e}"))
        }
        other => query_err(context, other),
    }
}

fn sql_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn live_filter(now: DateTime<Utc>) -> String {
    format!("expires_at_ms > {}", now.timestamp_millis())
}

fn expired_filter(now: DateTime<Utc>) -> String {
    format!("expires_at_ms <= {}", now.timestamp_millis())
}

fn outcome_filter(filter: &OutcomeFilter) -> Option<String> {
    match filter {
        OutcomeFilter::Any => None,
        OutcomeFilter::OneOf(set) => {
            let values: Vec<String> = set.iter().map(|o| sql_quote(o.as_str())).collect();
            Some(format!("outcome IN ({})", values.join(", ")))
        }
    }
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, IndexError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| IndexError::Query(format!("missing string column {name}")))
}

fn i64_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, IndexError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| IndexError::Query(format!("missing int64 column {name}")))
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

async fn collect(
    stream: impl futures_util::Stream<Item = Result<RecordBatch, lancedb::Error>>,
) -> Result<Vec<RecordBatch>, IndexError> {
    stream
        .try_collect()
        .await
        .map_err(|e| lance_err("Failed to collect results", e))
}

/// LanceDB implementation of the memory index.
pub struct LanceVectorIndex {
    store: LanceVectorStore,
    dimension: usize,
}

impl LanceVectorIndex {
    pub fn new(store: LanceVectorStore, dimension: usize) -> Self {
        Self { store, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn interventions_table(&self, user_id: &UserId) -> Result<lancedb::Table, IndexError> {
        self.store
            .ensure_table(
                &LanceVectorStore::interventions_table_name(user_id),
                Arc::new(interventions_schema(self.dimension)),
            )
            .await
            .map_err(|e| lance_err("Failed to open intervention table", e))
    }

    async fn reflections_table(&self, user_id: &UserId) -> Result<lancedb::Table, IndexError> {
        self.store
            .ensure_table(
                &LanceVectorStore::reflections_table_name(user_id),
                Arc::new(reflections_schema()),
            )
            .await
            .map_err(|e| lance_err("Failed to open reflection table", e))
    }

    async fn existing(&self, table_name: &str) -> Result<Option<lancedb::Table>, IndexError> {
        self.store
            .open_table(table_name)
            .await
            .map_err(|e| lance_err("Failed to open table", e))
    }

    fn table_name(user_id: &UserId, kind: RecordKind) -> String {
        match kind {
            RecordKind::Intervention => LanceVectorStore::interventions_table_name(user_id),
            RecordKind::Reflection => LanceVectorStore::reflections_table_name(user_id),
        }
    }

    fn intervention_batch(&self, record: &InterventionRecord) -> Result<RecordBatch, IndexError> {
        if record.embedding.len() != self.dimension {
            return Err(IndexError::Query(format!(
                "embedding has {} dimensions, index expects {}",
                record.embedding.len(),
                self.dimension
            )));
        }
        let schema = Arc::new(interventions_schema(self.dimension));
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(record.embedding.clone())),
            None,
        )
        .map_err(|e| query_err("Failed to build vector column", e))?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![record.key.to_string()])),
                Arc::new(StringArray::from(vec![record.key.user_id.to_string()])),
                Arc::new(StringArray::from(vec![record.intervention_text.clone()])),
                Arc::new(StringArray::from(vec![record.context.clone()])),
                Arc::new(StringArray::from(vec![record.task.clone()])),
                Arc::new(StringArray::from(vec![record.outcome.as_str().to_string()])),
                Arc::new(Int64Array::from(vec![record.key.timestamp_ms])),
                Arc::new(Int64Array::from(vec![record.created_at.timestamp_millis()])),
                Arc::new(Int64Array::from(vec![record.expires_at.timestamp_millis()])),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| query_err("Failed to build record batch", e))
    }

    fn reflection_batch(record: &ReflectionRecord) -> Result<RecordBatch, IndexError> {
        RecordBatch::try_new(
            Arc::new(reflections_schema()),
            vec![
                Arc::new(StringArray::from(vec![record.key.to_string()])),
                Arc::new(StringArray::from(vec![record.key.user_id.to_string()])),
                Arc::new(StringArray::from(vec![record.insight.clone()])),
                Arc::new(StringArray::from(vec![record.session_summary.clone()])),
                Arc::new(Int64Array::from(vec![record.key.timestamp_ms])),
                Arc::new(Int64Array::from(vec![record.created_at.timestamp_millis()])),
                Arc::new(Int64Array::from(vec![record.expires_at.timestamp_millis()])),
            ],
        )
        .map_err(|e| query_err("Failed to build record batch", e))
    }

    /// Parse KNN result rows. Rows with unparseable keys are skipped.
    fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<KnnHit>, IndexError> {
        let keys = string_col(batch, "key")?;
        let texts = string_col(batch, "intervention_text")?;
        let contexts = string_col(batch, "context")?;
        let tasks = string_col(batch, "task")?;
        let outcomes = string_col(batch, "outcome")?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let mut hits = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let key: RecordKey = match keys.value(i).parse() {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(key = keys.value(i), error = %e, "skipping row with malformed key");
                    continue;
                }
            };
            hits.push(KnnHit {
                key,
                intervention_text: texts.value(i).to_string(),
                context: contexts.value(i).to_string(),
                task: tasks.value(i).to_string(),
                outcome: Outcome::from(outcomes.value(i)),
                distance: distances.map_or(0.0, |d| d.value(i)),
            });
        }
        Ok(hits)
    }

    fn batch_to_reflections(batch: &RecordBatch) -> Result<Vec<ReflectionRecord>, IndexError> {
        let keys = string_col(batch, "key")?;
        let insights = string_col(batch, "insight")?;
        let summaries = string_col(batch, "session_summary")?;
        let created = i64_col(batch, "created_at_ms")?;
        let expires = i64_col(batch, "expires_at_ms")?;

        let mut records = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let Ok(key) = keys.value(i).parse::<RecordKey>() else {
                tracing::warn!(key = keys.value(i), "skipping reflection with malformed key");
                continue;
            };
            records.push(ReflectionRecord {
                key,
                insight: insights.value(i).to_string(),
                session_summary: summaries.value(i).to_string(),
                created_at: from_millis(created.value(i)),
                expires_at: from_millis(expires.value(i)),
            });
        }
        Ok(records)
    }

    async fn count_where(&self, table_name: &str, filter: Option<String>) -> Result<u64, IndexError> {
        let Some(table) = self.existing(table_name).await? else {
            return Ok(0);
        };
        let count = table
            .count_rows(filter)
            .await
            .map_err(|e| lance_err("Failed to count rows", e))?;
        Ok(count as u64)
    }
}

impl VectorIndex for LanceVectorIndex {
    async fn ping(&self) -> Result<(), IndexError> {
        self.store
            .table_names()
            .await
            .map(|_| ())
            .map_err(|e| IndexError::Connection(e.to_string()))
    }

    async fn create_index(&self, user_id: &UserId) -> Result<IndexStatus, IndexError> {
        let (_, status) = self
            .store
            .create_table(
                &LanceVectorStore::interventions_table_name(user_id),
                Arc::new(interventions_schema(self.dimension)),
            )
            .await
            .map_err(|e| lance_err("Failed to create intervention table", e))?;
        Ok(match status {
            TableStatus::Created => IndexStatus::Created,
            TableStatus::Existing => IndexStatus::AlreadyExists,
        })
    }

    async fn index_exists(&self, user_id: &UserId) -> Result<bool, IndexError> {
        Ok(self
            .existing(&LanceVectorStore::interventions_table_name(user_id))
            .await?
            .is_some())
    }

    async fn insert_intervention(&self, record: &InterventionRecord) -> Result<(), IndexError> {
        let batch = self.intervention_batch(record)?;
        let table = self.interventions_table(&record.key.user_id).await?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| lance_err("Failed to add intervention", e))?;
        Ok(())
    }

    async fn knn_query(
        &self,
        user_id: &UserId,
        vector: &[f32],
        k: usize,
        filter: &OutcomeFilter,
    ) -> Result<Vec<KnnHit>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if let OutcomeFilter::OneOf(set) = filter {
            if set.is_empty() {
                return Ok(Vec::new());
            }
        }
        let Some(table) = self
            .existing(&LanceVectorStore::interventions_table_name(user_id))
            .await?
        else {
            return Ok(Vec::new());
        };

        let mut predicate = live_filter(Utc::now());
        if let Some(outcomes) = outcome_filter(filter) {
            predicate = format!("{predicate} AND {outcomes}");
        }

        let stream = table
            .vector_search(vector)
            .map_err(|e| lance_err("Vector search setup failed", e))?
            .distance_type(lancedb::DistanceType::Cosine)
            .only_if(predicate)
            .limit(k)
            .execute()
            .await
            .map_err(|e| lance_err("Vector search failed", e))?;

        let mut hits = Vec::new();
        for batch in collect(stream).await? {
            hits.extend(Self::batch_to_hits(&batch)?);
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn insert_reflection(&self, record: &ReflectionRecord) -> Result<(), IndexError> {
        let batch = Self::reflection_batch(record)?;
        let table = self.reflections_table(&record.key.user_id).await?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| lance_err("Failed to add reflection", e))?;
        Ok(())
    }

    async fn recent_reflections(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<ReflectionRecord>, IndexError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(table) = self
            .existing(&LanceVectorStore::reflections_table_name(user_id))
            .await?
        else {
            return Ok(Vec::new());
        };

        let stream = table
            .query()
            .only_if(live_filter(Utc::now()))
            .execute()
            .await
            .map_err(|e| lance_err("Failed to query reflections", e))?;

        let mut records = Vec::new();
        for batch in collect(stream).await? {
            records.extend(Self::batch_to_reflections(&batch)?);
        }
        records.sort_by(|a, b| b.key.timestamp_ms.cmp(&a.key.timestamp_ms));
        records.truncate(limit);
        Ok(records)
    }

    async fn count(&self, user_id: &UserId, kind: RecordKind) -> Result<u64, IndexError> {
        self.count_where(
            &Self::table_name(user_id, kind),
            Some(live_filter(Utc::now())),
        )
        .await
    }

    async fn purge_expired(&self, user_id: &UserId) -> Result<u64, IndexError> {
        let now = Utc::now();
        let mut removed = 0;
        for kind in [RecordKind::Intervention, RecordKind::Reflection] {
            let table_name = Self::table_name(user_id, kind);
            let Some(table) = self.existing(&table_name).await? else {
                continue;
            };
            let filter = expired_filter(now);
            let expired = table
                .count_rows(Some(filter.clone()))
                .await
                .map_err(|e| lance_err("Failed to count expired rows", e))?;
            if expired == 0 {
                continue;
            }
            table
                .delete(&filter)
                .await
                .map_err(|e| lance_err("Failed to delete expired rows", e))?;
            removed += expired as u64;
        }
        if removed > 0 {
            tracing::info!(user_id = %user_id, removed, "purged expired records");
        }
        Ok(removed)
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<u64, IndexError> {
        let mut removed = 0;
        for kind in [RecordKind::Intervention, RecordKind::Reflection] {
            let table_name = Self::table_name(user_id, kind);
            removed += self.count_where(&table_name, None).await?;
            self.store
                .drop_table(&table_name)
                .await
                .map_err(|e| lance_err("Failed to drop table", e))?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use chrono::Duration as ChronoDuration;

    const DIM: usize = 8;

    async fn setup() -> (LanceVectorIndex, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = LanceVectorStore::new(temp_dir.path().to_path_buf())
            .await
            .expect("Failed to create LanceVectorStore");
        (LanceVectorIndex::new(store, DIM), temp_dir)
    }

    fn user() -> UserId {
        UserId::parse("lance_user").unwrap()
    }

    fn unit(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; DIM];
        v[axis] = 1.0;
        v
    }

    fn intervention(ts: i64, embedding: Vec<f32>, outcome: Outcome, ttl: ChronoDuration) -> InterventionRecord {
        let now = Utc::now();
        InterventionRecord {
            key: RecordKey::new(user(), RecordKind::Intervention, ts),
            intervention_text: format!("intervention {ts}"),
            context: format!("context {ts}"),
            task: "general".to_string(),
            outcome,
            embedding,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    fn reflection(ts: i64, insight: &str, ttl: ChronoDuration) -> ReflectionRecord {
        let now = Utc::now();
        ReflectionRecord {
            key: RecordKey::new(user(), RecordKind::Reflection, ts),
            insight: insight.to_string(),
            session_summary: "USER: hi".to_string(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    #[tokio::test]
    async fn test_create_index_is_idempotent() {
        let (index, _tmp) = setup().await;
        assert!(!index.index_exists(&user()).await.unwrap());
        assert_eq!(index.create_index(&user()).await.unwrap(), IndexStatus::Created);
        assert_eq!(
            index.create_index(&user()).await.unwrap(),
            IndexStatus::AlreadyExists
        );
        assert!(index.index_exists(&user()).await.unwrap());
        index.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_knn_orders_by_distance_and_filters_outcome() {
        let (index, _tmp) = setup().await;
        let day = ChronoDuration::days(1);
        index
            .insert_intervention(&intervention(1, unit(0), Outcome::TaskCompleted, day))
            .await
            .unwrap();
        index
            .insert_intervention(&intervention(2, unit(1), Outcome::ReEngaged, day))
            .await
            .unwrap();
        index
            .insert_intervention(&intervention(3, unit(0), Outcome::Abandoned, day))
            .await
            .unwrap();

        let mut query = unit(0);
        query[1] = 0.5;
        let hits = index
            .knn_query(&user(), &query, 5, &OutcomeFilter::successful())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].key.timestamp_ms, 1);
        assert!(hits[0].distance <= hits[1].distance);

        let all = index
            .knn_query(&user(), &query, 5, &OutcomeFilter::Any)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let top = index
            .knn_query(&user(), &query, 1, &OutcomeFilter::Any)
            .await
            .unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(index.count(&user(), RecordKind::Intervention).await.unwrap(), 3);
    }

    #[test]
    fn test_storage_faults_map_to_connection() {
        let err = lance_err(
            "Failed to open table",
            lancedb::Error::CreateDir {
                path: "/readonly".to_string(),
                source: std::io::Error::other("read-only file system"),
            },
        );
        assert!(matches!(err, IndexError::Connection(_)));

        let err = lance_err(
            "Vector search failed",
            lancedb::Error::InvalidInput {
                message: "bad filter".to_string(),
            },
        );
        assert!(matches!(err, IndexError::Query(_)));
    }

    #[tokio::test]
    async fn test_missing_user_reads_are_empty() {
        let (index, _tmp) = setup().await;
        assert!(index
            .knn_query(&user(), &unit(0), 3, &OutcomeFilter::Any)
            .await
            .unwrap()
            .is_empty());
        assert!(index.recent_reflections(&user(), 3).await.unwrap().is_empty());
        assert_eq!(index.count(&user(), RecordKind::Reflection).await.unwrap(), 0);
        assert_eq!(index.delete_user(&user()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let (index, _tmp) = setup().await;
        let record = intervention(1, vec![1.0; 3], Outcome::TaskCompleted, ChronoDuration::days(1));
        assert!(matches!(
            index.insert_intervention(&record).await,
            Err(IndexError::Query(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_reflections_newest_first() {
        let (index, _tmp) = setup().await;
        let day = ChronoDuration::days(1);
        for (ts, insight) in [(10, "first"), (30, "third"), (20, "second")] {
            index.insert_reflection(&reflection(ts, insight, day)).await.unwrap();
        }
        let recent = index.recent_reflections(&user(), 2).await.unwrap();
        let insights: Vec<&str> = recent.iter().map(|r| r.insight.as_str()).collect();
        assert_eq!(insights, vec!["third", "second"]);
    }

    #[tokio::test]
    async fn test_expired_records_hidden_then_purged() {
        let (index, _tmp) = setup().await;
        let short = ChronoDuration::milliseconds(300);
        index
            .insert_intervention(&intervention(1, unit(0), Outcome::TaskCompleted, short))
            .await
            .unwrap();
        index
            .insert_intervention(&intervention(2, unit(0), Outcome::TaskCompleted, ChronoDuration::days(1)))
            .await
            .unwrap();
        index.insert_reflection(&reflection(3, "old", short)).await.unwrap();
        assert_eq!(index.count(&user(), RecordKind::Intervention).await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(index.count(&user(), RecordKind::Intervention).await.unwrap(), 1);
        assert_eq!(index.count(&user(), RecordKind::Reflection).await.unwrap(), 0);
        let hits = index
            .knn_query(&user(), &unit(0), 5, &OutcomeFilter::Any)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.timestamp_ms, 2);

        assert_eq!(index.purge_expired(&user()).await.unwrap(), 2);
        assert_eq!(index.purge_expired(&user()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_user_drops_everything() {
        let (index, _tmp) = setup().await;
        let day = ChronoDuration::days(1);
        index.create_index(&user()).await.unwrap();
        index
            .insert_intervention(&intervention(1, unit(0), Outcome::TaskCompleted, day))
            .await
            .unwrap();
        index.insert_reflection(&reflection(2, "note", day)).await.unwrap();

        assert_eq!(index.delete_user(&user()).await.unwrap(), 2);
        assert!(!index.index_exists(&user()).await.unwrap());
        assert_eq!(index.count(&user(), RecordKind::Intervention).await.unwrap(), 0);
    }
}
