//! Monoplan-Core: job planning for multi-app monorepos
//!
//! Decides which build/deploy jobs must run for a VCS event, honoring
//! inter-app dependencies.
//!
//! ## Layer 1 - Planning
//!
//! - `graph`: dependency resolution, cycle detection, effective commits
//! - `materialize`: apps × jobs → concrete jobs
//! - `filter`: event/branch and changed-file selection
//! - `planner`: the composed pipeline
//!
//! Execution-state coordination lives in `monoplan-state`.

pub mod domain;
pub mod error;
pub mod filter;
pub mod graph;
pub mod materialize;
pub mod obs;
pub mod planner;
pub mod telemetry;
pub mod vcs;

pub use domain::{
    AppCatalog, AppDeclaration, CommitInfo, DependencySpec, EventKind, EventTrigger, Job,
    JobContext, JobDeclaration, TriggerEvent, TriggerSpec,
};
pub use error::{PlanError, PlanResult, VcsError};
pub use filter::{ChangeImpactFilter, EventFilter};
pub use graph::{
    detect_cycles, normalize_path, DependencyMap, DependencyResolver,
    EffectiveTimestampCalculator, ResolvedDependency,
};
pub use materialize::{extract_app_label, JobMaterializer};
pub use planner::{JobPlanner, Plan, PlanOptions, SkipReason, SkippedJob};
pub use telemetry::init_tracing;
pub use vcs::{CommitSource, GitCommitSource, StaticCommitSource, DEFAULT_FETCH_CONCURRENCY};
