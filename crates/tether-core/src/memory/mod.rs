//! Per-user long-term memory.
//!
//! This module defines the `EmbeddingProvider` and `VectorIndex` ports that
//! the infrastructure layer implements, their `Box*` dynamic-dispatch
//! wrappers, and the `MemoryStore` that validates, keys and stamps records
//! before they reach the index.

pub mod box_embedder;
pub mod box_vector;
pub mod clock;
pub mod embedder;
pub mod store;
pub mod validate;
pub mod vector;
