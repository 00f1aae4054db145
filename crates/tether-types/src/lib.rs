//! Shared domain types for Tether.
//!
//! This crate contains the domain types used across the Tether workspace:
//! memory records, live session events, configuration, and error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod memory;
pub mod session;
