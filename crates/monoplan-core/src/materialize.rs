//! Job materialization: apps × declared jobs → concrete [`Job`]s.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{AppCatalog, CommitInfo, Job, JobContext};

/// Label of an app relative to the configured root directory.
///
/// A root of `""` or `"."` yields the path minus a leading `./`. A leading
/// `./` and trailing `/` on the root are ignored. Paths outside the root are
/// returned unchanged.
pub fn extract_app_label(app_path: &str, root_dir: &str) -> String {
    let root = root_dir.trim_end_matches('/');
    let root = root.strip_prefix("./").unwrap_or(root);

    if root.is_empty() || root == "." {
        return app_path.strip_prefix("./").unwrap_or(app_path).to_string();
    }

    match app_path.strip_prefix(root) {
        Some(rest) => rest.trim_start_matches('/').to_string(),
        None => app_path.to_string(),
    }
}

/// Builds jobs for one run.
#[derive(Debug, Clone, Default)]
pub struct JobMaterializer {
    pub correlation_key: String,
    pub event_ref: String,
    pub root_dir: String,
    /// Keep a job only if its config map has every one of these keys.
    pub required_config_keys: Vec<String>,
}

impl JobMaterializer {
    /// One job per (app, job key), carrying the app's effective commit.
    ///
    /// Apps missing from `effective` are planned at [`CommitInfo::unknown`].
    pub fn materialize(
        &self,
        catalog: &AppCatalog,
        effective: &BTreeMap<PathBuf, CommitInfo>,
    ) -> Vec<Job> {
        let mut jobs = Vec::new();

        for app in catalog.iter() {
            let commit = effective
                .get(&app.path)
                .cloned()
                .unwrap_or_else(CommitInfo::unknown);
            let app_label = extract_app_label(&app.path.to_string_lossy(), &self.root_dir);

            for (job_key, decl) in &app.jobs {
                if !self
                    .required_config_keys
                    .iter()
                    .all(|key| decl.configs.contains_key(key))
                {
                    debug!(app = %app.path.display(), job = %job_key, "missing required config keys");
                    continue;
                }

                jobs.push(Job {
                    app: Arc::clone(app),
                    context: JobContext {
                        correlation_key: self.correlation_key.clone(),
                        event_ref: self.event_ref.clone(),
                        app_path: app.path.clone(),
                        root_dir: self.root_dir.clone(),
                        job_key: job_key.clone(),
                        effective_commit: commit.clone(),
                        label: format!("{app_label} / {job_key}"),
                    },
                    on: decl.on.clone(),
                    configs: decl.configs.clone(),
                    params: BTreeMap::new(),
                });
            }
        }

        jobs
    }
}
