//! Infrastructure layer for Tether.
//!
//! Contains implementations of the ports defined in `tether-core`: the
//! LanceDB vector index, fastembed and Gemini embedding providers, the
//! Gemini summarizer, plus config loading and health checks.

pub mod config;
pub mod gemini;
pub mod health;
pub mod vector;
