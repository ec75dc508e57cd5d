//! Scope hierarchy and task-identity reconciliation for tasktree stores.

pub mod config;
pub mod context;
pub mod error;
pub mod ids;
pub mod import;
pub mod paths;
pub mod record;
pub mod resolve;
pub mod scope;
pub mod scope_config;
pub mod scope_ops;
pub mod store;
pub mod task_ops;
pub mod topology;
pub mod vcs;

pub use context::Context;
pub use error::{ErrorCode, Result, TasktreeError};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
