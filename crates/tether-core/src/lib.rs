//! Business logic and port trait definitions for Tether.
//!
//! This crate defines the "ports" (embedding, vector index, summarization,
//! live transport) that the infrastructure layer implements. It depends
//! only on `tether-types`, never on `tether-infra` or any database/IO crate.

pub mod memory;
pub mod reflection;
pub mod retrieval;
pub mod retry;
pub mod session;
pub mod tools;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;
