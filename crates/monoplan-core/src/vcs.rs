//! Version-control collaborator.
//!
//! [`CommitSource`] supplies the last commit touching a path and the files
//! changed between two revisions. [`GitCommitSource`] shells out to `git`;
//! [`StaticCommitSource`] serves fixed answers for tests and offline plans.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::CommitInfo;
use crate::error::VcsError;
use crate::graph::normalize_path;

/// Default number of commit lookups allowed in flight at once.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

#[async_trait]
pub trait CommitSource: Send + Sync {
    /// Last commit touching `path`.
    async fn last_commit(&self, path: &Path) -> Result<CommitInfo, VcsError>;

    /// Files changed between `base` and `head`, repository-relative.
    async fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>, VcsError>;
}

/// [`CommitSource`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCommitSource {
    repo_dir: PathBuf,
}

impl GitCommitSource {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await
            .map_err(|e| VcsError::Command {
                command: args.join(" "),
                detail: format!("failed to run git: {e}"),
            })?;

        if !output.status.success() {
            return Err(VcsError::Command {
                command: args.join(" "),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// `path` as git sees it from inside `repo_dir`.
    ///
    /// Planner paths are anchored at the repository root, so a relative root
    /// such as `../repo` shows up as a prefix that git must not see twice.
    fn pathspec(&self, path: &Path) -> String {
        let root = normalize_path(&self.repo_dir);
        let rel = match path.strip_prefix(&root) {
            Ok(rel) if rel.as_os_str().is_empty() => Path::new("."),
            Ok(rel) => rel,
            Err(_) => path,
        };
        rel.to_string_lossy().into_owned()
    }
}

#[async_trait]
impl CommitSource for GitCommitSource {
    async fn last_commit(&self, path: &Path) -> Result<CommitInfo, VcsError> {
        let path_arg = self.pathspec(path);
        let output = self
            .git(&["log", "-1", "--format=%H/%ct", "--", &path_arg])
            .await?;
        parse_log_line(&path_arg, &output)
    }

    async fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>, VcsError> {
        let output = self.git(&["diff", "--name-only", base, head]).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Parse `<hash>/<epoch seconds>` as printed by `git log --format=%H/%ct`.
fn parse_log_line(path: &str, output: &str) -> Result<CommitInfo, VcsError> {
    let parse_err = || VcsError::Parse {
        path: path.to_string(),
        output: output.to_string(),
    };

    let (hash, ts) = output.trim().split_once('/').ok_or_else(parse_err)?;
    let (hash, ts) = (hash.trim(), ts.trim());
    if hash.is_empty() || ts.is_empty() {
        return Err(parse_err());
    }
    let timestamp = ts.parse::<i64>().map_err(|_| parse_err())?;
    Ok(CommitInfo::new(hash, timestamp))
}

/// Fixed answers, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct StaticCommitSource {
    commits: BTreeMap<PathBuf, CommitInfo>,
    changed: Vec<String>,
}

impl StaticCommitSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commit(mut self, path: impl Into<PathBuf>, commit: CommitInfo) -> Self {
        self.commits.insert(path.into(), commit);
        self
    }

    pub fn with_changed_files(mut self, files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.changed = files.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl CommitSource for StaticCommitSource {
    async fn last_commit(&self, path: &Path) -> Result<CommitInfo, VcsError> {
        self.commits
            .get(path)
            .cloned()
            .ok_or_else(|| VcsError::Unknown {
                path: path.display().to_string(),
            })
    }

    async fn changed_files(&self, _base: &str, _head: &str) -> Result<Vec<String>, VcsError> {
        Ok(self.changed.clone())
    }
}

/// Look up the last commit of every path, at most `concurrency` at a time.
///
/// A failed lookup is logged and recorded as [`CommitInfo::unknown`], so the
/// result always has one entry per input path.
pub async fn fetch_commits_best_effort(
    source: Arc<dyn CommitSource>,
    paths: Vec<PathBuf>,
    concurrency: usize,
) -> BTreeMap<PathBuf, CommitInfo> {
    let sem = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(paths.len());

    for path in paths {
        let source = Arc::clone(&source);
        let sem = Arc::clone(&sem);
        tasks.push(tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.ok();
            let commit = match source.last_commit(&path).await {
                Ok(commit) => {
                    debug!(path = %path.display(), hash = %commit.hash, ts = commit.timestamp, "fetched last commit");
                    commit
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to get last commit info for {}", path.display());
                    CommitInfo::unknown()
                }
            };
            (path, commit)
        }));
    }

    let mut commits = BTreeMap::new();
    for task in tasks {
        match task.await {
            Ok((path, commit)) => {
                commits.insert(path, commit);
            }
            Err(e) => warn!(error = %e, "commit lookup task failed"),
        }
    }
    commits
}
