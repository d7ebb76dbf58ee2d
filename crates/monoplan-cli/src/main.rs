//! Monoplan CLI
//!
//! The `monoplan` command plans monorepo jobs for a VCS event and coordinates
//! their execution state across workflow runs.
//!
//! ## Commands
//!
//! - `plan`: select the jobs to run for an event
//! - `acquire`: claim the running slot for a planned job
//! - `finish`: record a job's outcome and release its running slot
//! - `state`: inspect or purge execution-state records

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use monoplan_core::{
    AppCatalog, CommitSource, GitCommitSource, Job, JobPlanner, Plan, PlanOptions, SkippedJob,
    TriggerEvent, DEFAULT_FETCH_CONCURRENCY,
};
use monoplan_state::{
    partition_key, AcquireOutcome, ExecutionStateStore, StateRecord, StateStore,
    SurrealStateStore, TerminalOutcome, TerminalReport, Tracked, TrackedJob, TtlPolicy,
};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "monoplan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Monorepo job planner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select the jobs to run for a VCS event
    Plan(PlanArgs),

    /// Claim the running slot for a job
    Acquire {
        /// Path to a tracked job (JSON), as found under `jobs[].tracked` in plan output
        #[arg(long)]
        job: PathBuf,

        #[command(flatten)]
        ttl: TtlArgs,
    },

    /// Record a job's outcome and release its running slot
    Finish {
        /// Path to a tracked job (JSON)
        #[arg(long)]
        job: PathBuf,

        /// success | failure | cancelled
        #[arg(long)]
        status: TerminalOutcome,

        #[command(flatten)]
        ttl: TtlArgs,
    },

    /// Inspect execution state
    State {
        #[command(subcommand)]
        action: StateAction,
    },
}

#[derive(Subcommand)]
enum StateAction {
    /// List live records for a correlation key
    List {
        #[arg(long)]
        correlation_key: String,
    },
    /// Remove expired records
    Purge,
}

#[derive(Args)]
struct PlanArgs {
    /// App catalog snapshot (JSON array of app declarations)
    #[arg(long)]
    apps: PathBuf,

    /// Event name: push | pull_request | pull_request_target
    #[arg(long)]
    event: String,

    /// Git ref of the event, e.g. refs/heads/main
    #[arg(long = "ref")]
    git_ref: String,

    /// Base branch for pull-request events
    #[arg(long)]
    base_ref: Option<String>,

    /// Repository root
    #[arg(long, default_value = ".")]
    repo_root: PathBuf,

    /// Directory app labels are relative to
    #[arg(long, default_value = "")]
    root_dir: String,

    /// Correlation key scoping execution state (default: the event ref)
    #[arg(long)]
    correlation_key: Option<String>,

    /// Keep only jobs whose configs contain this key (repeatable)
    #[arg(long = "require-config")]
    required_config_keys: Vec<String>,

    /// Drop jobs not affected by the changed files
    #[arg(long)]
    change_impact: bool,

    /// File listing changed paths, one per line
    #[arg(long, conflicts_with = "diff_base")]
    changed_files: Option<PathBuf>,

    /// Compute changed paths with `git diff <diff-base> <diff-head>`
    #[arg(long)]
    diff_base: Option<String>,

    #[arg(long, default_value = "HEAD")]
    diff_head: String,

    /// Drop jobs already running or succeeded for an equal or newer commit
    #[arg(long)]
    state_filter: bool,

    /// Maximum concurrent commit lookups
    #[arg(long, default_value_t = DEFAULT_FETCH_CONCURRENCY)]
    fetch_concurrency: usize,

    /// Write the plan here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct TtlArgs {
    /// Lifetime of running records, e.g. 1h or 45m
    #[arg(long, env = "MONOPLAN_RUNNING_TTL", default_value = "1h")]
    running_ttl: String,

    /// Lifetime of success records, e.g. 30d
    #[arg(long, env = "MONOPLAN_SUCCESS_TTL", default_value = "30d")]
    success_ttl: String,
}

impl TtlArgs {
    fn policy(&self) -> Result<TtlPolicy> {
        TtlPolicy::from_durations(&self.running_ttl, &self.success_ttl)
            .context("Invalid TTL configuration")
    }
}

/// A selected job plus the view the state commands take as input.
#[derive(Serialize)]
struct PlannedJob<'a> {
    #[serde(flatten)]
    job: &'a Job,
    tracked: TrackedJob,
}

#[derive(Serialize)]
struct PlanOutput<'a> {
    jobs: Vec<PlannedJob<'a>>,
    skipped: &'a [SkippedJob],
}

impl<'a> PlanOutput<'a> {
    fn new(plan: &'a Plan) -> Self {
        Self {
            jobs: plan
                .jobs
                .iter()
                .map(|job| PlannedJob {
                    job,
                    tracked: job.tracked(),
                })
                .collect(),
            skipped: &plan.skipped,
        }
    }
}

#[derive(Debug, Serialize)]
struct AcquireOutput {
    acquired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    holder: Option<StateRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FinishOutput {
    success_recorded: Option<bool>,
    running_released: bool,
}

impl From<TerminalReport> for FinishOutput {
    fn from(report: TerminalReport) -> Self {
        Self {
            success_recorded: report.success_recorded,
            running_released: report.running_released,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    monoplan_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Plan(args) => {
            let state = if args.state_filter {
                Some(ExecutionStateStore::new(open_store().await?, TtlPolicy::default()))
            } else {
                None
            };
            let commits: Arc<dyn CommitSource> = Arc::new(GitCommitSource::new(&args.repo_root));
            let plan = cmd_plan(&args, commits, state).await?;
            let json = serde_json::to_string_pretty(&PlanOutput::new(&plan))?;
            match &args.output {
                Some(path) => {
                    std::fs::write(path, json)
                        .with_context(|| format!("Failed to write plan to {}", path.display()))?;
                    info!(path = %path.display(), "plan written");
                }
                None => println!("{json}"),
            }
            Ok(())
        }
        Commands::Acquire { job, ttl } => {
            let state = ExecutionStateStore::new(open_store().await?, ttl.policy()?);
            let out = cmd_acquire(&state, &job).await?;
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Commands::Finish { job, status, ttl } => {
            let state = ExecutionStateStore::new(open_store().await?, ttl.policy()?);
            let out = cmd_finish(&state, &job, status).await?;
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Commands::State { action } => {
            let store = open_store().await?;
            match action {
                StateAction::List { correlation_key } => {
                    let records = cmd_state_list(store.as_ref(), &correlation_key).await?;
                    println!("{}", serde_json::to_string_pretty(&records)?);
                }
                StateAction::Purge => {
                    let removed = store
                        .purge_expired()
                        .await
                        .context("Failed to purge expired records")?;
                    println!("Purged {removed} expired record(s)");
                }
            }
            Ok(())
        }
    }
}

async fn open_store() -> Result<Arc<dyn StateStore>> {
    let store = SurrealStateStore::from_env()
        .await
        .context("Failed to connect to state store")?;
    Ok(Arc::new(store))
}

async fn cmd_plan(
    args: &PlanArgs,
    commits: Arc<dyn CommitSource>,
    state: Option<ExecutionStateStore>,
) -> Result<Plan> {
    let catalog_json = std::fs::read_to_string(&args.apps)
        .with_context(|| format!("Failed to read app catalog {}", args.apps.display()))?;
    let catalog = AppCatalog::from_json(&catalog_json)
        .with_context(|| format!("Invalid app catalog {}", args.apps.display()))?;

    let event = TriggerEvent {
        name: args.event.clone(),
        git_ref: args.git_ref.clone(),
        base_ref: args.base_ref.clone(),
    };

    let changed_files = if args.change_impact {
        load_changed_files(args, commits.as_ref()).await?
    } else {
        Vec::new()
    };

    let options = PlanOptions {
        repo_root: args.repo_root.clone(),
        root_dir: args.root_dir.clone(),
        correlation_key: args
            .correlation_key
            .clone()
            .unwrap_or_else(|| args.git_ref.clone()),
        required_config_keys: args.required_config_keys.clone(),
        change_impact: args.change_impact,
        state_filter: args.state_filter,
        fetch_concurrency: args.fetch_concurrency,
    };

    let mut planner = JobPlanner::new(commits, options);
    if let Some(state) = state {
        planner = planner.with_state(state);
    }

    let plan = planner
        .plan(&catalog, &event, &changed_files)
        .await
        .context("Planning failed")?;
    info!(
        selected = plan.jobs.len(),
        skipped = plan.skipped.len(),
        "planned {} job(s)",
        plan.jobs.len()
    );
    Ok(plan)
}

async fn load_changed_files(args: &PlanArgs, commits: &dyn CommitSource) -> Result<Vec<String>> {
    if let Some(path) = &args.changed_files {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read changed files {}", path.display()))?;
        return Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect());
    }
    match &args.diff_base {
        Some(base) => commits
            .changed_files(base, &args.diff_head)
            .await
            .with_context(|| format!("Failed to diff {base}..{}", args.diff_head)),
        None => anyhow::bail!("--change-impact needs --changed-files or --diff-base"),
    }
}

fn read_tracked_job(path: &Path) -> Result<TrackedJob> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid job {}", path.display()))
}

async fn cmd_acquire(state: &ExecutionStateStore, job_path: &Path) -> Result<AcquireOutput> {
    let job = read_tracked_job(job_path)?;
    let outcome = state
        .try_acquire_running(&job)
        .await
        .with_context(|| format!("Failed to acquire running state for {}", job.label))?;
    Ok(match outcome {
        AcquireOutcome::Acquired => AcquireOutput {
            acquired: true,
            holder: None,
        },
        AcquireOutcome::Preempted { holder } => AcquireOutput {
            acquired: false,
            holder,
        },
    })
}

async fn cmd_finish(
    state: &ExecutionStateStore,
    job_path: &Path,
    status: TerminalOutcome,
) -> Result<FinishOutput> {
    let job = read_tracked_job(job_path)?;
    let report = state
        .mark_terminal(&job, status)
        .await
        .with_context(|| format!("Failed to record {status} for {}", job.label))?;
    Ok(report.into())
}

async fn cmd_state_list(store: &dyn StateStore, correlation_key: &str) -> Result<Vec<StateRecord>> {
    store
        .query_partition(&partition_key(correlation_key))
        .await
        .context("Failed to query state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use monoplan_core::{CommitInfo, StaticCommitSource};
    use monoplan_state::MemoryStateStore;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn plan_args(dir: &Path, apps: PathBuf) -> PlanArgs {
        PlanArgs {
            apps,
            event: "push".to_string(),
            git_ref: "refs/heads/main".to_string(),
            base_ref: None,
            repo_root: dir.to_path_buf(),
            root_dir: dir.join("apps").to_string_lossy().into_owned(),
            correlation_key: None,
            required_config_keys: Vec::new(),
            change_impact: false,
            changed_files: None,
            diff_base: None,
            diff_head: "HEAD".to_string(),
            state_filter: false,
            fetch_concurrency: 2,
            output: None,
        }
    }

    fn catalog_json(dir: &Path) -> String {
        serde_json::json!([
            {
                "path": dir.join("apps/web"),
                "dependsOn": ["../shared"],
                "jobs": { "build": { "on": { "push": { "branches": ["main"] } } } }
            },
            {
                "path": dir.join("apps/shared"),
                "jobs": { "build": { "on": { "pull_request": null } } }
            }
        ])
        .to_string()
    }

    #[tokio::test]
    async fn plan_then_acquire_then_finish() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("apps/web")).unwrap();
        std::fs::create_dir_all(dir.path().join("apps/shared")).unwrap();
        let apps = write(dir.path(), "apps.json", &catalog_json(dir.path()));

        let commits: Arc<dyn CommitSource> = Arc::new(
            StaticCommitSource::new()
                .with_commit(dir.path().join("apps/web"), CommitInfo::new("w", 100))
                .with_commit(dir.path().join("apps/shared"), CommitInfo::new("s", 200)),
        );
        let plan = cmd_plan(&plan_args(dir.path(), apps), commits, None)
            .await
            .unwrap();

        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.jobs[0].label(), "web / build");
        assert_eq!(plan.jobs[0].context.effective_commit.timestamp, 200);
        assert_eq!(plan.skipped.len(), 1);

        let output = serde_json::to_value(PlanOutput::new(&plan)).unwrap();
        let tracked = output["jobs"][0]["tracked"].to_string();
        assert!(tracked.contains("refs/heads/main"));
        let job_path = write(dir.path(), "job.json", &tracked);

        let state = ExecutionStateStore::new(Arc::new(MemoryStateStore::new()), TtlPolicy::default());
        assert!(cmd_acquire(&state, &job_path).await.unwrap().acquired);
        assert!(!cmd_acquire(&state, &job_path).await.unwrap().acquired);

        let finished = cmd_finish(&state, &job_path, TerminalOutcome::Success)
            .await
            .unwrap();
        assert_eq!(finished.success_recorded, Some(true));
        assert!(finished.running_released);
    }

    #[tokio::test]
    async fn change_impact_requires_a_change_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("apps/web")).unwrap();
        std::fs::create_dir_all(dir.path().join("apps/shared")).unwrap();
        let apps = write(dir.path(), "apps.json", &catalog_json(dir.path()));

        let mut args = plan_args(dir.path(), apps);
        args.change_impact = true;
        let err = cmd_plan(&args, Arc::new(StaticCommitSource::new()), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--changed-files"));

        args.changed_files = Some(write(dir.path(), "changed.txt", "apps/shared/lib.ts\n\n"));
        let plan = cmd_plan(&args, Arc::new(StaticCommitSource::new()), None)
            .await
            .unwrap();
        assert_eq!(plan.jobs.len(), 1);
    }

    #[tokio::test]
    async fn state_list_reads_partition() {
        let store = Arc::new(MemoryStateStore::new());
        let state = ExecutionStateStore::new(store.clone(), TtlPolicy::default());
        let job = TrackedJob {
            correlation_key: "refs/heads/main".to_string(),
            app_path: "apps/web".to_string(),
            job_key: "build".to_string(),
            label: "web / build".to_string(),
            commit_hash: "abc".to_string(),
            commit_ts: 1,
        };
        state.try_acquire_running(&job).await.unwrap();

        let records = cmd_state_list(store.as_ref(), "refs/heads/main").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].commit_hash, "abc");
    }

    #[test]
    fn cli_parses_finish_status_and_ttls() {
        let cli = Cli::try_parse_from([
            "monoplan",
            "finish",
            "--job",
            "job.json",
            "--status",
            "cancelled",
            "--running-ttl",
            "2h",
        ])
        .unwrap();
        match cli.command {
            Commands::Finish { status, ttl, .. } => {
                assert_eq!(status, TerminalOutcome::Cancelled);
                assert_eq!(ttl.policy().unwrap().running_secs, 7_200);
            }
            _ => panic!("expected finish"),
        }
    }
}
