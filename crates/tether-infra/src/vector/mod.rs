//! Vector database infrastructure for memory embeddings.
//!
//! Provides LanceDB table management, the `VectorIndex` implementation,
//! and fastembed-based local embedding generation. Arrow schemas define
//! the table structures.

pub mod embedder;
pub mod index;
pub mod lance;
pub mod schema;
