//! Keywarden Agent Library
//!
//! Drives the rotation engine from a profiles file: a file-backed secret
//! store, a JSON state file standing in for profile status, and a reconcile
//! loop with graceful shutdown.

pub mod agent;
pub mod config;
pub mod state;

pub use agent::{Agent, PassSummary};
pub use config::AgentConfig;
pub use state::StateFile;
