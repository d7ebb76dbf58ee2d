//! SurrealDB-backed StateStore implementation
//!
//! Each conditional operation is a single `BEGIN … COMMIT` transaction that
//! reads the current row, `THROW`s when the condition does not hold, and
//! writes otherwise. A thrown condition failure is translated into the
//! `ConditionFailed` outcome; every other statement error is a backend error.
//!
//! Two transactions touching the same record can abort at commit with a
//! read/write conflict before either condition was decided. Such attempts are
//! re-run, a bounded number of times, until one of them commits or throws.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::error::StorageError;
use crate::handle::{self, StoreConfig};
use crate::record::{StateKey, StateRecord};
use crate::storage_traits::{DeleteOutcome, PutOutcome, StateStore, StorageResult};

/// Marker thrown by the conditional transactions.
const CONDITION_FAILED: &str = "monoplan_condition_failed";

/// Attempts per conditional operation when commits keep conflicting.
const MAX_TXN_ATTEMPTS: u32 = 32;

/// How one run of a conditional transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Committed,
    ConditionFailed,
    /// Aborted by a concurrent writer; the condition was never decided.
    Conflict,
}

fn is_retryable_conflict(message: &str) -> bool {
    message.contains("can be retried") || message.contains("read or write conflict")
}

const PUT_IF_NEWER: &str = r#"
    BEGIN TRANSACTION;
    LET $current = (SELECT * FROM ONLY type::thing('job_state', [$pk, $sk]));
    IF $current != NONE AND $current.ttl > $now AND $current.commitTs >= $record.commitTs {
        THROW "monoplan_condition_failed";
    };
    UPSERT type::thing('job_state', [$pk, $sk]) CONTENT $record;
    COMMIT TRANSACTION;
"#;

const DELETE_IF_COMMIT: &str = r#"
    BEGIN TRANSACTION;
    LET $current = (SELECT * FROM ONLY type::thing('job_state', [$pk, $sk]));
    IF $current = NONE OR $current.ttl <= $now OR $current.commitTs != $commit_ts {
        THROW "monoplan_condition_failed";
    };
    DELETE type::thing('job_state', [$pk, $sk]);
    COMMIT TRANSACTION;
"#;

/// SurrealDB-backed implementation of [`StateStore`].
pub struct SurrealStateStore {
    db: Surreal<Any>,
    clock: Arc<dyn Clock>,
}

impl SurrealStateStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect(&StoreConfig::in_memory()).await
    }

    /// Create from environment variables (see [`StoreConfig::from_env`]).
    pub async fn from_env() -> crate::Result<Self> {
        Self::connect(&StoreConfig::from_env()).await
    }

    pub async fn connect(config: &StoreConfig) -> crate::Result<Self> {
        let db = handle::connect(config).await?;
        info!("SurrealStateStore ready");
        Ok(Self {
            db,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used to decide record expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // -- private helpers -----------------------------------------------------

    /// Fetch the live record at `key`, if any.
    async fn fetch_live(&self, key: &StateKey) -> StorageResult<Option<StateRecord>> {
        let mut res = self
            .db
            .query("SELECT * OMIT id FROM type::thing('job_state', [$pk, $sk]) WHERE ttl > $now")
            .bind(("pk", key.pk.clone()))
            .bind(("sk", key.sk.clone()))
            .bind(("now", self.clock.epoch_secs()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<StateRecord> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().next())
    }

    /// Classify one transaction run into committed, condition failure,
    /// retryable conflict, or a hard backend error.
    fn classify(res: surrealdb::Result<surrealdb::Response>) -> StorageResult<Attempt> {
        let mut res = match res {
            Ok(res) => res,
            Err(e) if is_retryable_conflict(&e.to_string()) => return Ok(Attempt::Conflict),
            Err(e) => return Err(StorageError::Backend(e.to_string())),
        };

        let errors = res.take_errors();
        if errors.is_empty() {
            return Ok(Attempt::Committed);
        }
        let mut messages: Vec<(usize, String)> = errors
            .into_iter()
            .map(|(idx, e)| (idx, e.to_string()))
            .collect();
        if messages.iter().any(|(_, m)| m.contains(CONDITION_FAILED)) {
            return Ok(Attempt::ConditionFailed);
        }
        if messages.iter().any(|(_, m)| is_retryable_conflict(m)) {
            return Ok(Attempt::Conflict);
        }
        messages.sort();
        Err(StorageError::Backend(
            messages
                .into_iter()
                .map(|(_, m)| m)
                .collect::<Vec<_>>()
                .join("; "),
        ))
    }

    async fn backoff(key: &StateKey, attempt: u32) {
        debug!(key = %key, attempt, "transaction conflict, retrying");
        tokio::time::sleep(Duration::from_millis(u64::from(attempt))).await;
    }

    fn exhausted(key: &StateKey) -> StorageError {
        StorageError::Backend(format!(
            "transaction on {key} kept conflicting after {MAX_TXN_ATTEMPTS} attempts"
        ))
    }
}

#[async_trait]
impl StateStore for SurrealStateStore {
    async fn put_if_newer(&self, record: StateRecord) -> StorageResult<PutOutcome> {
        let key = record.key();
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let res = self
                .db
                .query(PUT_IF_NEWER)
                .bind(("pk", key.pk.clone()))
                .bind(("sk", key.sk.clone()))
                .bind(("now", self.clock.epoch_secs()))
                .bind(("record", record.clone()))
                .await;

            match Self::classify(res)? {
                Attempt::Committed => return Ok(PutOutcome::Written),
                Attempt::ConditionFailed => {
                    debug!(key = %key, "conditional put lost");
                    let current = self.fetch_live(&key).await?;
                    return Ok(PutOutcome::ConditionFailed { current });
                }
                Attempt::Conflict => Self::backoff(&key, attempt).await,
            }
        }
        Err(Self::exhausted(&key))
    }

    async fn delete_if_commit(
        &self,
        key: &StateKey,
        commit_ts: i64,
    ) -> StorageResult<DeleteOutcome> {
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let res = self
                .db
                .query(DELETE_IF_COMMIT)
                .bind(("pk", key.pk.clone()))
                .bind(("sk", key.sk.clone()))
                .bind(("now", self.clock.epoch_secs()))
                .bind(("commit_ts", commit_ts))
                .await;

            match Self::classify(res)? {
                Attempt::Committed => return Ok(DeleteOutcome::Deleted),
                Attempt::ConditionFailed => {
                    debug!(key = %key, commit_ts, "conditional delete lost");
                    let current = self.fetch_live(key).await?;
                    return Ok(DeleteOutcome::ConditionFailed { current });
                }
                Attempt::Conflict => Self::backoff(key, attempt).await,
            }
        }
        Err(Self::exhausted(key))
    }

    async fn query_partition(&self, pk: &str) -> StorageResult<Vec<StateRecord>> {
        let mut res = self
            .db
            .query("SELECT * OMIT id FROM job_state WHERE pk = $pk AND ttl > $now ORDER BY sk")
            .bind(("pk", pk.to_string()))
            .bind(("now", self.clock.epoch_secs()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        res.take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        let mut res = self
            .db
            .query("DELETE job_state WHERE ttl <= $now RETURN BEFORE")
            .bind(("now", self.clock.epoch_secs()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let removed: Vec<StateRecord> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        debug!(removed = removed.len(), "purged expired state records");
        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_conflicts_are_retryable() {
        assert!(is_retryable_conflict(
            "Failed to commit transaction due to a read or write conflict. This transaction can be retried"
        ));
        assert!(!is_retryable_conflict("An error occurred: monoplan_condition_failed"));
        assert!(!is_retryable_conflict("Parse error: unexpected token"));
    }
}
