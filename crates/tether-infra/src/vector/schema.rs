//! Arrow schema definitions for LanceDB memory tables.
//!
//! Each user gets an `interventions_{user}` table carrying the embedding
//! column and a `reflections_{user}` table without one. Both carry
//! `expires_at_ms`, which every read filters on.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// fastembed BGESmallENV15 embedding dimension.
pub const DEFAULT_DIMENSION: usize = 384;

/// Gemini `text-embedding-004` dimension.
pub const GEMINI_DIMENSION: usize = 768;

pub fn vector_field(dimension: usize) -> Field {
    Field::new(
        "vector",
        DataType::FixedSizeList(
            Arc::new(Field::new("item", DataType::Float32, true)),
            dimension as i32,
        ),
        false,
    )
}

/// Schema for per-user intervention tables.
pub fn interventions_schema(dimension: usize) -> Schema {
    Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("user_id", DataType::Utf8, false),
        Field::new("intervention_text", DataType::Utf8, false),
        Field::new("context", DataType::Utf8, false),
        Field::new("task", DataType::Utf8, false),
        Field::new("outcome", DataType::Utf8, false),
        Field::new("timestamp_ms", DataType::Int64, false),
        Field::new("created_at_ms", DataType::Int64, false),
        Field::new("expires_at_ms", DataType::Int64, false),
        vector_field(dimension),
    ])
}

/// Schema for per-user reflection tables.
pub fn reflections_schema() -> Schema {
    Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("user_id", DataType::Utf8, false),
        Field::new("insight", DataType::Utf8, false),
        Field::new("session_summary", DataType::Utf8, false),
        Field::new("timestamp_ms", DataType::Int64, false),
        Field::new("created_at_ms", DataType::Int64, false),
        Field::new("expires_at_ms", DataType::Int64, false),
    ])
}
