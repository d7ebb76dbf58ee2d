//! Changed-file impact filtering.
//!
//! Each changed file is attributed to the app with the longest path that
//! contains it, so nested apps win over their parents. The directly affected
//! set is then closed over the dependency graph: an app is affected when any
//! of its resolved dependencies is.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::Job;
use crate::graph::DependencyMap;

/// Selects jobs whose app is affected by a set of changed files.
#[derive(Debug, Clone)]
pub struct ChangeImpactFilter<'a> {
    repo_root: &'a Path,
    deps: &'a DependencyMap,
    /// (repo-relative path, app path), longest relative path first.
    prefixes: Vec<(String, PathBuf)>,
}

impl<'a> ChangeImpactFilter<'a> {
    /// `deps` must hold an entry for every app; its keys are the app set.
    pub fn new(repo_root: &'a Path, deps: &'a DependencyMap) -> Self {
        let mut prefixes: Vec<(String, PathBuf)> = deps
            .keys()
            .map(|app| (repo_relative(repo_root, app), app.clone()))
            .collect();
        // Stable: equal lengths keep path order.
        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            repo_root,
            deps,
            prefixes,
        }
    }

    /// Apps whose own directory contains at least one changed file.
    pub fn directly_affected(&self, changed_files: &[String]) -> BTreeSet<PathBuf> {
        let mut affected = BTreeSet::new();
        for file in changed_files {
            let file = strip_dot_slash(file);
            let owner = self.prefixes.iter().find(|(prefix, _)| {
                file == prefix
                    || (file.starts_with(prefix.as_str())
                        && file.as_bytes().get(prefix.len()) == Some(&b'/'))
            });
            if let Some((_, app)) = owner {
                affected.insert(app.clone());
            }
        }
        affected
    }

    /// Directly affected apps plus everything that transitively depends on them.
    pub fn affected_apps(&self, changed_files: &[String]) -> BTreeSet<PathBuf> {
        let mut affected = self.directly_affected(changed_files);

        let mut grew = true;
        while grew {
            grew = false;
            for (app, deps) in self.deps {
                if affected.contains(app) {
                    continue;
                }
                if deps.iter().any(|d| affected.contains(&d.resolved)) {
                    affected.insert(app.clone());
                    grew = true;
                }
            }
        }

        debug!(
            root = %self.repo_root.display(),
            changed = changed_files.len(),
            affected = affected.len(),
            "change impact computed"
        );
        affected
    }

    /// Split `jobs` into (kept, dropped).
    pub fn apply(&self, jobs: Vec<Job>, changed_files: &[String]) -> (Vec<Job>, Vec<Job>) {
        let affected = self.affected_apps(changed_files);
        jobs.into_iter()
            .partition(|job| affected.contains(&job.context.app_path))
    }
}

fn strip_dot_slash(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}

/// `app` relative to `repo_root` as a `/`-separated string.
fn repo_relative(repo_root: &Path, app: &Path) -> String {
    let rel = app.strip_prefix(repo_root).unwrap_or(app);
    let rel = rel.to_string_lossy().replace('\\', "/");
    strip_dot_slash(&rel).trim_end_matches('/').to_string()
}
