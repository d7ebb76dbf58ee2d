//! In-memory fake for the state store (testing and dry runs)
//!
//! `MemoryStateStore` satisfies the [`StateStore`] contract without any
//! external dependencies. Expiry is evaluated against an injectable
//! [`Clock`], so tests can move time forward to exercise TTL reclamation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::clock::{Clock, SystemClock};
use crate::error::StorageError;
use crate::record::{StateKey, StateRecord};
use crate::storage_traits::*;

/// In-memory state store backed by a `BTreeMap<StateKey, StateRecord>`.
pub struct MemoryStateStore {
    records: Mutex<BTreeMap<StateKey, StateRecord>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MemoryStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStateStore").finish_non_exhaustive()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            clock,
        }
    }

    /// Number of stored records, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, BTreeMap<StateKey, StateRecord>>> {
        self.records
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }

    fn live<'a>(
        records: &'a BTreeMap<StateKey, StateRecord>,
        key: &StateKey,
        now: i64,
    ) -> Option<&'a StateRecord> {
        records.get(key).filter(|r| !r.is_expired(now))
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn put_if_newer(&self, record: StateRecord) -> StorageResult<PutOutcome> {
        let now = self.clock.epoch_secs();
        let key = record.key();
        let mut records = self.lock()?;
        if let Some(current) = Self::live(&records, &key, now) {
            if current.commit_ts >= record.commit_ts {
                return Ok(PutOutcome::ConditionFailed {
                    current: Some(current.clone()),
                });
            }
        }
        records.insert(key, record);
        Ok(PutOutcome::Written)
    }

    async fn delete_if_commit(
        &self,
        key: &StateKey,
        commit_ts: i64,
    ) -> StorageResult<DeleteOutcome> {
        let now = self.clock.epoch_secs();
        let mut records = self.lock()?;
        match Self::live(&records, key, now).cloned() {
            Some(current) if current.commit_ts == commit_ts => {
                records.remove(key);
                Ok(DeleteOutcome::Deleted)
            }
            current => Ok(DeleteOutcome::ConditionFailed { current }),
        }
    }

    async fn query_partition(&self, pk: &str) -> StorageResult<Vec<StateRecord>> {
        let now = self.clock.epoch_secs();
        let records = self.lock()?;
        Ok(records
            .values()
            .filter(|r| r.pk == pk && !r.is_expired(now))
            .cloned()
            .collect())
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        let now = self.clock.epoch_secs();
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        Ok(before - records.len())
    }
}
