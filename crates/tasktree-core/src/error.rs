use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::record::RecordError;
use crate::scope_config::ScopeConfigError;
use crate::store::StoreError;

/// Stable machine-readable error codes surfaced by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotInGitRepo,
    ScopeNotFound,
    ScopeAmbiguous,
    ScopeHasTasks,
    AlreadyHasParent,
    InvalidState,
    TaskNotFound,
    InvalidArgs,
    ImportSourceNotFound,
    WorktreeNotFound,
    IoError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotInGitRepo => "not_in_git_repo",
            ErrorCode::ScopeNotFound => "scope_not_found",
            ErrorCode::ScopeAmbiguous => "scope_ambiguous",
            ErrorCode::ScopeHasTasks => "scope_has_tasks",
            ErrorCode::AlreadyHasParent => "already_has_parent",
            ErrorCode::InvalidState => "invalid_state",
            ErrorCode::TaskNotFound => "task_not_found",
            ErrorCode::InvalidArgs => "invalid_args",
            ErrorCode::ImportSourceNotFound => "import_source_not_found",
            ErrorCode::WorktreeNotFound => "worktree_not_found",
            ErrorCode::IoError => "io_error",
        }
    }
}

/// One candidate listed by an ambiguous task reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousMatch {
    pub scope: String,
    pub id: String,
    /// Shortest prefix of `id` that is unique among every match, plus display margin.
    pub short: String,
}

#[derive(Debug, Error)]
pub enum TasktreeError {
    #[error("Not inside a git repository: {}", .0.display())]
    NotInGitRepo(PathBuf),
    #[error("Scope not found: {0}")]
    ScopeNotFound(String),
    #[error("Scope '{id}' is ambiguous; candidates: {}", join_candidates(.candidates))]
    ScopeAmbiguous { id: String, candidates: Vec<String> },
    #[error("Scope {scope} still holds {count} task(s); pass --force to delete it")]
    ScopeHasTasks { scope: String, count: usize },
    #[error("Store {0} already has a parent")]
    AlreadyHasParent(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("{message}")]
    AmbiguousTask {
        prefix: String,
        matches: Vec<AmbiguousMatch>,
        message: String,
    },
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("Import source not found: {0}")]
    ImportSourceNotFound(String),
    #[error("No worktree checked out on branch {0}")]
    WorktreeNotFound(String),
    #[error("git: {0}")]
    Vcs(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    ScopeConfig(#[from] ScopeConfigError),
}

impl TasktreeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TasktreeError::NotInGitRepo(_) => ErrorCode::NotInGitRepo,
            TasktreeError::ScopeNotFound(_) => ErrorCode::ScopeNotFound,
            TasktreeError::ScopeAmbiguous { .. } => ErrorCode::ScopeAmbiguous,
            TasktreeError::ScopeHasTasks { .. } => ErrorCode::ScopeHasTasks,
            TasktreeError::AlreadyHasParent(_) => ErrorCode::AlreadyHasParent,
            TasktreeError::InvalidState(_) => ErrorCode::InvalidState,
            TasktreeError::TaskNotFound(_) => ErrorCode::TaskNotFound,
            TasktreeError::AmbiguousTask { .. } | TasktreeError::InvalidArgs(_) => {
                ErrorCode::InvalidArgs
            }
            TasktreeError::ImportSourceNotFound(_) => ErrorCode::ImportSourceNotFound,
            TasktreeError::WorktreeNotFound(_) => ErrorCode::WorktreeNotFound,
            TasktreeError::Vcs(_)
            | TasktreeError::Store(_)
            | TasktreeError::Record(_)
            | TasktreeError::ScopeConfig(_) => ErrorCode::IoError,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TasktreeError::TaskNotFound(_))
    }
}

fn join_candidates(candidates: &[String]) -> String {
    candidates.join(", ")
}

pub type Result<T, E = TasktreeError> = std::result::Result<T, E>;
