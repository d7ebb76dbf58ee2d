//! Storage trait definitions for monoplan
//!
//! `StateStore` is the one primitive every backend must offer: an atomic
//! compare-and-swap style put and delete over [`StateRecord`]s, plus a
//! partition query. All cross-run synchronization is built on it; no
//! in-process locking is needed on top.
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{StateKey, StateRecord};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result of a conditional put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The record was stored.
    Written,
    /// A live record with an equal or newer commit timestamp already exists.
    ///
    /// `current` is that record when the backend could read it back.
    ConditionFailed { current: Option<StateRecord> },
}

impl PutOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, PutOutcome::Written)
    }
}

/// Result of a conditional delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The record existed with the expected commit timestamp and was removed.
    Deleted,
    /// No live record, or a record owned by a different commit.
    ConditionFailed { current: Option<StateRecord> },
}

/// Execution-state store.
///
/// Guarantees:
/// - `put_if_newer(r)` succeeds iff no live record exists at `r.key()` OR the
///   existing record's `commit_ts < r.commit_ts`. The check and write are atomic.
/// - `delete_if_commit(k, ts)` removes the record iff it is live and its
///   `commit_ts == ts`.
/// - Records whose `ttl` has passed are treated as absent by every operation.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Conditionally write `record` under the newer-commit-wins rule.
    async fn put_if_newer(&self, record: StateRecord) -> StorageResult<PutOutcome>;

    /// Conditionally delete the record at `key` if it belongs to `commit_ts`.
    async fn delete_if_commit(&self, key: &StateKey, commit_ts: i64)
        -> StorageResult<DeleteOutcome>;

    /// All live records in a partition, ordered by sort key.
    async fn query_partition(&self, pk: &str) -> StorageResult<Vec<StateRecord>>;

    /// Physically remove expired records. Returns how many were removed.
    async fn purge_expired(&self) -> StorageResult<usize>;
}
