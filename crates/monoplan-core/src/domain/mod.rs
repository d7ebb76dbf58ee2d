//! Domain models for monoplan.
//!
//! - `AppDeclaration` / `JobDeclaration`: validated app and job declarations
//! - `AppCatalog`: the immutable snapshot of every app in one run
//! - `CommitInfo`: last-change information for a path
//! - `TriggerEvent`: the normalized VCS event being planned for
//! - `Job`: a materialized (app, job) pair

pub mod app;
pub mod commit;
pub mod event;
pub mod job;

pub use app::{AppCatalog, AppDeclaration, DependencySpec, EventTrigger, JobDeclaration, TriggerSpec};
pub use commit::CommitInfo;
pub use event::{EventKind, TriggerEvent};
pub use job::{Job, JobContext};
