//! Error types for monoplan-state

use thiserror::Error;

/// Errors raised while connecting to or preparing a state backend.
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// `job_state` definitions were rejected
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

/// Errors returned by [`crate::StateStore`] operations.
///
/// A lost conditional write is *not* an error; it is reported through
/// [`crate::PutOutcome::ConditionFailed`] / [`crate::DeleteOutcome::ConditionFailed`].
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backing store rejected or failed the request.
    #[error("state backend error: {0}")]
    Backend(String),

    /// A TTL duration string could not be parsed.
    #[error("invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },
}
