//! End-to-end planning for one VCS event.
//!
//! ```text
//! resolve deps → detect cycles → validate event → fetch commits
//!   → effective commits → materialize → event filter
//!   → [change impact] → [state skip set] → Plan
//! ```
//!
//! Configuration errors abort before any job is selected. Commit lookups are
//! best-effort. Change impact and state filtering are opt-in through
//! [`PlanOptions`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use monoplan_state::{ExecutionStateStore, JobStatus, StateRecord};
use serde::Serialize;
use tracing::{warn, Instrument};

use crate::domain::{AppCatalog, Job, TriggerEvent};
use crate::error::PlanResult;
use crate::filter::{ChangeImpactFilter, EventFilter};
use crate::graph::{
    anchor_path, detect_cycles, normalize_path, DependencyResolver, EffectiveTimestampCalculator,
};
use crate::materialize::JobMaterializer;
use crate::obs;
use crate::vcs::{fetch_commits_best_effort, CommitSource, DEFAULT_FETCH_CONCURRENCY};

/// Inputs that stay fixed for one planning invocation.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Repository root; `$repoRoot/` dependency specs are joined with it.
    pub repo_root: PathBuf,
    /// Directory app labels are made relative to; relative values are taken
    /// from `repo_root`, and empty means `repo_root` itself.
    pub root_dir: String,
    /// Scope of execution-state records, e.g. the ref being built.
    pub correlation_key: String,
    pub required_config_keys: Vec<String>,
    /// Drop jobs whose app is not affected by the changed files.
    pub change_impact: bool,
    /// Drop jobs already running or succeeded for an equal or newer commit.
    pub state_filter: bool,
    pub fetch_concurrency: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            root_dir: String::new(),
            correlation_key: String::new(),
            required_config_keys: Vec::new(),
            change_impact: false,
            state_filter: false,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }
}

/// Why a job is not part of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The job's triggers do not accept the event.
    EventMismatch,
    /// No changed file affects the job's app or its dependencies.
    NotAffected,
    /// A run for an equal or newer commit is recorded.
    Preempted {
        status: JobStatus,
        commit_hash: String,
        commit_ts: i64,
    },
}

impl SkipReason {
    fn preempted_by(record: &StateRecord) -> Self {
        SkipReason::Preempted {
            status: record.job_status,
            commit_hash: record.commit_hash.clone(),
            commit_ts: record.commit_ts,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EventMismatch => f.write_str("no trigger matches the event"),
            SkipReason::NotAffected => f.write_str("not affected by changed files"),
            SkipReason::Preempted {
                status,
                commit_hash,
                ..
            } => write!(f, "already {status} for commit {commit_hash}"),
        }
    }
}

/// A job left out of the plan.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedJob {
    pub label: String,
    pub app_path: PathBuf,
    pub job_key: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

impl SkippedJob {
    fn new(job: &Job, reason: SkipReason) -> Self {
        obs::emit_job_skipped(job.label(), &reason);
        Self {
            label: job.context.label.clone(),
            app_path: job.context.app_path.clone(),
            job_key: job.context.job_key.clone(),
            reason,
        }
    }
}

/// Result of planning.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub jobs: Vec<Job>,
    pub skipped: Vec<SkippedJob>,
}

/// Composes the planning stages.
pub struct JobPlanner {
    commits: Arc<dyn CommitSource>,
    state: Option<ExecutionStateStore>,
    options: PlanOptions,
}

impl JobPlanner {
    pub fn new(commits: Arc<dyn CommitSource>, options: PlanOptions) -> Self {
        Self {
            commits,
            state: None,
            options,
        }
    }

    /// Store consulted when [`PlanOptions::state_filter`] is set.
    pub fn with_state(mut self, state: ExecutionStateStore) -> Self {
        self.state = Some(state);
        self
    }

    pub fn options(&self) -> &PlanOptions {
        &self.options
    }

    /// Plan the jobs to run for `event`.
    ///
    /// `changed_files` is only consulted when change impact is enabled.
    pub async fn plan(
        &self,
        catalog: &AppCatalog,
        event: &TriggerEvent,
        changed_files: &[String],
    ) -> PlanResult<Plan> {
        let span = obs::plan_span(&self.options.correlation_key);
        self.plan_inner(catalog, event, changed_files)
            .instrument(span)
            .await
    }

    async fn plan_inner(
        &self,
        catalog: &AppCatalog,
        event: &TriggerEvent,
        changed_files: &[String],
    ) -> PlanResult<Plan> {
        let opts = &self.options;
        let started = Instant::now();
        obs::emit_plan_started(&opts.correlation_key, &event.name, catalog.len());

        // App paths, `$repoRoot/` targets and the label root share one namespace.
        let repo_root = normalize_path(&opts.repo_root);
        let catalog = &catalog.anchored(&repo_root);
        let root_dir = anchor_path(&repo_root, Path::new(&opts.root_dir));

        let deps = DependencyResolver::new(&repo_root).resolve(catalog)?;
        detect_cycles(&deps)?;
        let event_filter = EventFilter::new(event)?;

        let own = fetch_commits_best_effort(
            Arc::clone(&self.commits),
            catalog.paths().cloned().collect(),
            opts.fetch_concurrency,
        )
        .await;
        let mut calc = EffectiveTimestampCalculator::new(&deps, own);
        calc.fetch_missing(Arc::clone(&self.commits), opts.fetch_concurrency)
            .await;
        let effective = calc.compute_all();

        let materializer = JobMaterializer {
            correlation_key: opts.correlation_key.clone(),
            event_ref: event.git_ref.clone(),
            root_dir: root_dir.to_string_lossy().into_owned(),
            required_config_keys: opts.required_config_keys.clone(),
        };
        let jobs = materializer.materialize(catalog, &effective);

        let mut skipped = Vec::new();

        let (mut jobs, dropped) = event_filter.apply(jobs);
        skipped.extend(
            dropped
                .iter()
                .map(|j| SkippedJob::new(j, SkipReason::EventMismatch)),
        );

        if opts.change_impact {
            let (kept, dropped) =
                ChangeImpactFilter::new(&repo_root, &deps).apply(jobs, changed_files);
            skipped.extend(
                dropped
                    .iter()
                    .map(|j| SkippedJob::new(j, SkipReason::NotAffected)),
            );
            jobs = kept;
        }

        if opts.state_filter {
            match &self.state {
                Some(state) => {
                    let skip_set = state.query_skip_set(&opts.correlation_key).await?;
                    let (kept, preempted) = skip_set.partition(jobs);
                    skipped.extend(
                        preempted
                            .iter()
                            .map(|(j, record)| SkippedJob::new(j, SkipReason::preempted_by(record))),
                    );
                    jobs = kept;
                }
                None => warn!("state filter requested but no state store is configured"),
            }
        }

        obs::emit_plan_finished(
            &opts.correlation_key,
            jobs.len(),
            skipped.len(),
            started.elapsed().as_millis() as u64,
        );
        Ok(Plan { jobs, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AppDeclaration, CommitInfo, EventTrigger, JobDeclaration};
    use crate::error::PlanError;
    use crate::vcs::StaticCommitSource;

    fn push_job(branches: &[&str]) -> JobDeclaration {
        let trigger = EventTrigger {
            branches: Some(branches.iter().map(|b| b.to_string()).collect()),
        };
        JobDeclaration {
            on: [("push".to_string(), Some(trigger))].into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unsupported_event_fails_even_without_jobs() {
        let planner = JobPlanner::new(Arc::new(StaticCommitSource::new()), PlanOptions::default());
        let event = TriggerEvent {
            name: "release".to_string(),
            git_ref: "refs/tags/v1".to_string(),
            base_ref: None,
        };
        let err = planner
            .plan(&AppCatalog::default(), &event, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::UnsupportedEvent { .. }));
    }

    #[tokio::test]
    async fn event_mismatch_is_reported_as_skip() {
        let dir = tempfile::tempdir().unwrap();
        let web = dir.path().join("apps/web");
        std::fs::create_dir_all(&web).unwrap();

        let catalog = AppCatalog::new([AppDeclaration::new(&web)
            .with_job("build", push_job(&["main"]))
            .with_job("release", push_job(&["release/*"]))]);
        let commits = StaticCommitSource::new().with_commit(&web, CommitInfo::new("w", 10));
        let planner = JobPlanner::new(
            Arc::new(commits),
            PlanOptions {
                repo_root: dir.path().to_path_buf(),
                root_dir: dir.path().join("apps").to_string_lossy().into_owned(),
                correlation_key: "refs/heads/main".to_string(),
                ..Default::default()
            },
        );

        let plan = planner
            .plan(&catalog, &TriggerEvent::push("refs/heads/main"), &[])
            .await
            .unwrap();

        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.jobs[0].label(), "web / build");
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].label, "web / release");
        assert_eq!(plan.skipped[0].reason, SkipReason::EventMismatch);
    }

    #[test]
    fn preempted_reason_names_the_commit() {
        let reason = SkipReason::Preempted {
            status: JobStatus::Running,
            commit_hash: "abc123".to_string(),
            commit_ts: 5,
        };
        assert_eq!(reason.to_string(), "already running for commit abc123");
    }
}
