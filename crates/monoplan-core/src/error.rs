//! Error types for planning.

use std::path::PathBuf;

use monoplan_state::StorageError;
use thiserror::Error;

/// Failures reported by a [`crate::vcs::CommitSource`].
#[derive(Debug, Error)]
pub enum VcsError {
    /// The VCS command could not be started or exited unsuccessfully.
    #[error("git {command} failed: {detail}")]
    Command { command: String, detail: String },

    /// The VCS produced output that could not be interpreted.
    #[error("unexpected git output for {path}: {output:?}")]
    Parse { path: String, output: String },

    /// No commit information is known for the path.
    #[error("no commit information for {path}")]
    Unknown { path: String },
}

/// Errors produced while building a plan.
///
/// The first four variants mean the declared configuration is invalid and
/// abort the whole run before any job is selected.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("app {app} depends on itself")]
    SelfDependency { app: PathBuf },

    #[error("dependency {dependency} of app {app} does not exist")]
    DependencyNotFound { app: PathBuf, dependency: PathBuf },

    #[error("circular dependency detected involving app {app}")]
    CircularDependency { app: PathBuf },

    #[error("unsupported event: {event}")]
    UnsupportedEvent { event: String },

    #[error("vcs error: {0}")]
    Vcs(#[from] VcsError),

    #[error("state store error: {0}")]
    State(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias.
pub type PlanResult<T> = std::result::Result<T, PlanError>;
