//! Live session plumbing: per-session state and transcript, the context
//! injector, the intervention recorder and the session driver.

pub mod injector;
pub mod live;
pub mod manager;
pub mod query;
pub mod recorder;
pub mod state;
pub mod transcript;
pub mod transport;
