//! Execution-state protocol built on [`StateStore`] conditional writes.
//!
//! Per (partition, app, job):
//!
//! ```text
//! absent  --acquire(ts wins)-------------> running
//! running --terminal(success)------------> success   [running record deleted]
//! running --terminal(failure/cancelled)--> absent
//! running --acquire(newer ts)------------> running   [record overwritten]
//! success --acquire(newer ts, success)---> success
//! any     --TTL expiry-------------------> absent
//! ```
//!
//! Losing a conditional write is an expected outcome, never an error: it means
//! a newer commit already owns the slot, so only that job is skipped.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::clock::{Clock, SystemClock};
use crate::record::{partition_key, JobStatus, StateRecord, TrackedJob};
use crate::storage_traits::{DeleteOutcome, PutOutcome, StateStore, StorageResult};
use crate::ttl::TtlPolicy;

/// Result of [`ExecutionStateStore::try_acquire_running`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// This job now owns the running slot.
    Acquired,
    /// A run for an equal or newer commit holds the slot.
    Preempted { holder: Option<StateRecord> },
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired)
    }
}

/// How a job finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalOutcome {
    Success,
    Failure,
    Cancelled,
}

impl std::str::FromStr for TerminalOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(TerminalOutcome::Success),
            "failure" => Ok(TerminalOutcome::Failure),
            "cancelled" => Ok(TerminalOutcome::Cancelled),
            other => Err(format!("invalid job status: {other}")),
        }
    }
}

impl std::fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TerminalOutcome::Success => "success",
            TerminalOutcome::Failure => "failure",
            TerminalOutcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What [`ExecutionStateStore::mark_terminal`] actually changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalReport {
    /// `None` for non-success outcomes; otherwise whether the success record
    /// was written (false means a newer success already exists).
    pub success_recorded: Option<bool>,
    /// Whether this job's own running record was removed.
    pub running_released: bool,
}

/// Anything that can be projected onto a [`TrackedJob`].
pub trait Tracked {
    fn tracked(&self) -> TrackedJob;
}

impl Tracked for TrackedJob {
    fn tracked(&self) -> TrackedJob {
        self.clone()
    }
}

/// Latest recorded commit per (app path, job key) within one partition.
#[derive(Debug, Clone, Default)]
pub struct SkipSet {
    latest: HashMap<(String, String), StateRecord>,
}

impl SkipSet {
    /// Build from the records of one partition, keeping the newest commit per
    /// (app, job) across running and success records.
    pub fn from_records(records: impl IntoIterator<Item = StateRecord>) -> Self {
        let mut latest: HashMap<(String, String), StateRecord> = HashMap::new();
        for record in records {
            let key = (record.app_path.clone(), record.job_key.clone());
            match latest.get(&key) {
                Some(existing) if existing.commit_ts >= record.commit_ts => {}
                _ => {
                    latest.insert(key, record);
                }
            }
        }
        Self { latest }
    }

    /// The record that pre-empts a job at `commit_ts`, if any.
    ///
    /// A job is pre-empted when a running or successful record exists for the
    /// same (app, job) with a commit timestamp ≥ its own.
    pub fn preempting(&self, app_path: &str, job_key: &str, commit_ts: i64) -> Option<&StateRecord> {
        self.latest
            .get(&(app_path.to_string(), job_key.to_string()))
            .filter(|record| commit_ts <= record.commit_ts)
    }

    /// Split `jobs` into those to keep and those pre-empted by a recorded run.
    pub fn partition<T: Tracked>(&self, jobs: Vec<T>) -> (Vec<T>, Vec<(T, StateRecord)>) {
        let mut kept = Vec::new();
        let mut skipped = Vec::new();
        for job in jobs {
            let tracked = job.tracked();
            match self.preempting(&tracked.app_path, &tracked.job_key, tracked.commit_ts) {
                Some(record) => skipped.push((job, record.clone())),
                None => kept.push(job),
            }
        }
        (kept, skipped)
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

/// Cross-run execution coordination for jobs.
#[derive(Clone)]
pub struct ExecutionStateStore {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    ttl: TtlPolicy,
}

impl ExecutionStateStore {
    pub fn new(store: Arc<dyn StateStore>, ttl: TtlPolicy) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            ttl,
        }
    }

    /// Replace the clock used to compute record expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        self.ttl
    }

    /// Claim the running slot for `job`.
    ///
    /// Succeeds iff no live running record exists or the existing one carries
    /// an older commit timestamp. Losing is logged and reported, not raised.
    #[instrument(skip_all, fields(label = %job.label, commit_ts = job.commit_ts))]
    pub async fn try_acquire_running(&self, job: &TrackedJob) -> StorageResult<AcquireOutcome> {
        let ttl = self.ttl.running_expiry(self.clock.epoch_secs());
        let record = StateRecord::for_job(job, JobStatus::Running, ttl);

        match self.store.put_if_newer(record).await? {
            PutOutcome::Written => {
                info!(
                    event = "state.acquired",
                    label = %job.label,
                    commit_hash = %job.commit_hash,
                    "{}: running state acquired",
                    job.label
                );
                Ok(AcquireOutcome::Acquired)
            }
            PutOutcome::ConditionFailed { current } => {
                info!(
                    event = "state.preempted",
                    label = %job.label,
                    holder_hash = %holder_hash(current.as_ref()),
                    "{}: a job is already running for a newer commit ({})",
                    job.label,
                    holder_hash(current.as_ref())
                );
                Ok(AcquireOutcome::Preempted { holder: current })
            }
        }
    }

    /// Read every record of a partition once and index it for skip checks.
    pub async fn query_skip_set(&self, correlation_key: &str) -> StorageResult<SkipSet> {
        let records = self
            .store
            .query_partition(&partition_key(correlation_key))
            .await?;
        Ok(SkipSet::from_records(records))
    }

    /// Record the end of a job run.
    ///
    /// On success, writes the success record under the newer-commit-wins rule.
    /// For every outcome, releases this job's own running record, but only if
    /// it still belongs to this job's commit.
    #[instrument(skip_all, fields(label = %job.label, outcome = %outcome))]
    pub async fn mark_terminal(
        &self,
        job: &TrackedJob,
        outcome: TerminalOutcome,
    ) -> StorageResult<TerminalReport> {
        let success_recorded = match outcome {
            TerminalOutcome::Success => Some(self.record_success(job).await),
            TerminalOutcome::Failure | TerminalOutcome::Cancelled => None,
        };

        // The running record is released whatever happened to the success write.
        let running_released = self.release_running(job).await?;
        let success_recorded = success_recorded.transpose()?;

        info!(
            event = "state.terminal",
            label = %job.label,
            outcome = %outcome,
            running_released,
            "{}: finished with {}",
            job.label,
            outcome
        );
        Ok(TerminalReport {
            success_recorded,
            running_released,
        })
    }

    /// Remove expired records from the backing store.
    pub async fn purge_expired(&self) -> StorageResult<usize> {
        self.store.purge_expired().await
    }

    async fn record_success(&self, job: &TrackedJob) -> StorageResult<bool> {
        let ttl = self.ttl.success_expiry(self.clock.epoch_secs());
        let record = StateRecord::for_job(job, JobStatus::Success, ttl);
        match self.store.put_if_newer(record).await? {
            PutOutcome::Written => Ok(true),
            PutOutcome::ConditionFailed { current } => {
                info!(
                    label = %job.label,
                    holder_hash = %holder_hash(current.as_ref()),
                    "{}: a newer commit is already recorded as success ({})",
                    job.label,
                    holder_hash(current.as_ref())
                );
                Ok(false)
            }
        }
    }

    async fn release_running(&self, job: &TrackedJob) -> StorageResult<bool> {
        let key = job.key(JobStatus::Running);
        match self.store.delete_if_commit(&key, job.commit_ts).await? {
            DeleteOutcome::Deleted => Ok(true),
            DeleteOutcome::ConditionFailed { current: Some(current) } => {
                info!(
                    label = %job.label,
                    holder_hash = %current.commit_hash,
                    "{}: a newer commit is already running ({})",
                    job.label,
                    current.commit_hash
                );
                Ok(false)
            }
            DeleteOutcome::ConditionFailed { current: None } => Ok(false),
        }
    }
}

fn holder_hash(record: Option<&StateRecord>) -> &str {
    record.map(|r| r.commit_hash.as_str()).unwrap_or("unknown")
}
