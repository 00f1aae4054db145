//! Tool command table and the built-in support tools.

pub mod builtin;
pub mod registry;
