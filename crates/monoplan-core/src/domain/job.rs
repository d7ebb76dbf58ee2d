//! Materialized jobs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use monoplan_state::{Tracked, TrackedJob};
use serde::Serialize;

use super::app::{AppDeclaration, TriggerSpec};
use super::commit::CommitInfo;

/// Where a job sits and which commit it is planned for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContext {
    pub correlation_key: String,
    pub event_ref: String,
    pub app_path: PathBuf,
    pub root_dir: String,
    pub job_key: String,
    pub effective_commit: CommitInfo,
    /// `"<app label> / <job key>"`.
    pub label: String,
}

/// One (app, job) pair selected for a run.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    #[serde(skip)]
    pub app: Arc<AppDeclaration>,
    pub context: JobContext,
    pub on: TriggerSpec,
    pub configs: BTreeMap<String, serde_json::Value>,
    /// Filled by later pipeline stages.
    pub params: BTreeMap<String, serde_json::Value>,
}

impl Job {
    pub fn label(&self) -> &str {
        &self.context.label
    }
}

impl Tracked for Job {
    fn tracked(&self) -> TrackedJob {
        let ctx = &self.context;
        TrackedJob {
            correlation_key: ctx.correlation_key.clone(),
            app_path: ctx.app_path.to_string_lossy().into_owned(),
            job_key: ctx.job_key.clone(),
            label: ctx.label.clone(),
            commit_hash: ctx.effective_commit.hash.clone(),
            commit_ts: ctx.effective_commit.timestamp,
        }
    }
}
