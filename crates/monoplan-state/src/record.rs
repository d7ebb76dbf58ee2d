//! Execution-state record shape.
//!
//! ```text
//! pk  = STATE#<correlationKey>
//! sk  = <appPath>#<jobKey>#<status>      status ∈ {running, success}
//! appPath, jobKey, jobStatus, commitTs, commitHash, ttl
//! ```
//!
//! At most one `running` and one `success` record exist per
//! (partition, app, job) because the status is part of the sort key.

use serde::{Deserialize, Serialize};

/// Prefix of every partition key.
pub const PARTITION_PREFIX: &str = "STATE#";

/// Build the partition key for a correlation key.
pub fn partition_key(correlation_key: &str) -> String {
    format!("{PARTITION_PREFIX}{correlation_key}")
}

/// Status component of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Success => "success",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary key of a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub pk: String,
    pub sk: String,
}

impl StateKey {
    pub fn new(correlation_key: &str, app_path: &str, job_key: &str, status: JobStatus) -> Self {
        Self {
            pk: partition_key(correlation_key),
            sk: format!("{app_path}#{job_key}#{status}"),
        }
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}

/// A single execution-state record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRecord {
    pub pk: String,
    pub sk: String,
    pub app_path: String,
    pub job_key: String,
    pub job_status: JobStatus,
    /// Commit timestamp, epoch seconds.
    pub commit_ts: i64,
    pub commit_hash: String,
    /// Expiry, epoch seconds.
    pub ttl: i64,
}

impl StateRecord {
    /// Build the record for `job` in `status`, expiring at `ttl`.
    pub fn for_job(job: &TrackedJob, status: JobStatus, ttl: i64) -> Self {
        let key = job.key(status);
        Self {
            pk: key.pk,
            sk: key.sk,
            app_path: job.app_path.clone(),
            job_key: job.job_key.clone(),
            job_status: status,
            commit_ts: job.commit_ts,
            commit_hash: job.commit_hash.clone(),
            ttl,
        }
    }

    pub fn key(&self) -> StateKey {
        StateKey {
            pk: self.pk.clone(),
            sk: self.sk.clone(),
        }
    }

    /// True once the record's TTL has passed.
    pub fn is_expired(&self, now: i64) -> bool {
        self.ttl <= now
    }
}

/// What the state store needs to know about a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedJob {
    pub correlation_key: String,
    pub app_path: String,
    pub job_key: String,
    /// Human-readable `"<app> / <job>"` label used in log lines.
    pub label: String,
    pub commit_hash: String,
    pub commit_ts: i64,
}

impl TrackedJob {
    pub fn partition_key(&self) -> String {
        partition_key(&self.correlation_key)
    }

    pub fn key(&self, status: JobStatus) -> StateKey {
        StateKey::new(&self.correlation_key, &self.app_path, &self.job_key, status)
    }
}
