//! Effective commit propagation.
//!
//! ```text
//! effective(app) = max-by-timestamp({own(app)} ∪ {effective(dep) | dep ∈ deps(app)})
//! ```
//!
//! Each node is resolved once, in post-order, with an explicit stack. Paths
//! that appear only as dependencies have no own commit up front; those are
//! fetched through the [`CommitSource`] before propagation, and a failed fetch
//! degrades to [`CommitInfo::unknown`] instead of aborting the run.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::domain::CommitInfo;
use crate::graph::resolver::DependencyMap;
use crate::vcs::{fetch_commits_best_effort, CommitSource};

/// Computes effective commits over a validated, acyclic [`DependencyMap`].
#[derive(Debug)]
pub struct EffectiveTimestampCalculator<'a> {
    deps: &'a DependencyMap,
    own: BTreeMap<PathBuf, CommitInfo>,
    memo: HashMap<PathBuf, CommitInfo>,
}

impl<'a> EffectiveTimestampCalculator<'a> {
    /// `own` holds the commits already known, normally one per target app.
    pub fn new(deps: &'a DependencyMap, own: BTreeMap<PathBuf, CommitInfo>) -> Self {
        Self {
            deps,
            own,
            memo: HashMap::new(),
        }
    }

    /// Paths reachable from the graph that have no known own commit.
    pub fn missing_paths(&self) -> Vec<PathBuf> {
        let mut missing = BTreeSet::new();
        for (app, deps) in self.deps {
            if !self.own.contains_key(app) {
                missing.insert(app.clone());
            }
            for dep in deps {
                if !self.own.contains_key(&dep.resolved) {
                    missing.insert(dep.resolved.clone());
                }
            }
        }
        missing.into_iter().collect()
    }

    /// Fetch commits for [`Self::missing_paths`] with at most `concurrency`
    /// requests in flight. Failures are logged and recorded as unknown.
    pub async fn fetch_missing(&mut self, source: Arc<dyn CommitSource>, concurrency: usize) {
        let missing = self.missing_paths();
        if missing.is_empty() {
            return;
        }
        debug!(count = missing.len(), "fetching dependency-only commits");
        let fetched = fetch_commits_best_effort(source, missing, concurrency).await;
        self.own.extend(fetched);
    }

    /// Effective commit of `app`, computing and memoizing everything below it.
    pub fn effective(&mut self, app: &Path) -> CommitInfo {
        if let Some(known) = self.memo.get(app) {
            return known.clone();
        }

        let deps = self.deps;
        // (node, children already pushed)
        let mut stack: Vec<(PathBuf, bool)> = vec![(app.to_path_buf(), false)];
        let mut on_path: HashSet<PathBuf> = HashSet::new();

        while let Some((node, expanded)) = stack.pop() {
            if self.memo.contains_key(&node) {
                continue;
            }

            let children = deps.get(&node).map(Vec::as_slice).unwrap_or(&[]);

            if !expanded {
                on_path.insert(node.clone());
                stack.push((node, true));
                for dep in children.iter().rev() {
                    if !self.memo.contains_key(&dep.resolved) && !on_path.contains(&dep.resolved) {
                        stack.push((dep.resolved.clone(), false));
                    }
                }
                continue;
            }

            let mut best = self
                .own
                .get(&node)
                .cloned()
                .unwrap_or_else(CommitInfo::unknown);
            for dep in children {
                if let Some(candidate) = self.memo.get(&dep.resolved) {
                    // Strictly greater: the first candidate seen wins ties.
                    if candidate.timestamp > best.timestamp {
                        best = candidate.clone();
                    }
                }
            }

            on_path.remove(&node);
            self.memo.insert(node, best);
        }

        self.memo
            .get(app)
            .cloned()
            .unwrap_or_else(CommitInfo::unknown)
    }

    /// Effective commit of every app in the dependency map.
    pub fn compute_all(&mut self) -> BTreeMap<PathBuf, CommitInfo> {
        let apps: Vec<PathBuf> = self.deps.keys().cloned().collect();
        apps.into_iter()
            .map(|app| {
                let commit = self.effective(&app);
                (app, commit)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DependencySpec;
    use crate::graph::resolver::ResolvedDependency;
    use crate::vcs::StaticCommitSource;

    fn deps(edges: &[(&str, &[&str])]) -> DependencyMap {
        edges
            .iter()
            .map(|(owner, targets)| {
                let resolved = targets
                    .iter()
                    .map(|t| ResolvedDependency {
                        owner: PathBuf::from(owner),
                        spec: DependencySpec::parse(t),
                        resolved: PathBuf::from(t),
                    })
                    .collect();
                (PathBuf::from(owner), resolved)
            })
            .collect()
    }

    fn own(commits: &[(&str, i64)]) -> BTreeMap<PathBuf, CommitInfo> {
        commits
            .iter()
            .map(|(p, ts)| (PathBuf::from(p), CommitInfo::new(format!("{p}@{ts}"), *ts)))
            .collect()
    }

    #[test]
    fn newer_dependency_raises_dependent() {
        let graph = deps(&[("/a", &[]), ("/b", &["/a"])]);

        let mut calc = EffectiveTimestampCalculator::new(&graph, own(&[("/a", 100), ("/b", 200)]));
        assert_eq!(calc.effective(Path::new("/a")).timestamp, 100);
        assert_eq!(calc.effective(Path::new("/b")).timestamp, 200);

        let mut calc = EffectiveTimestampCalculator::new(&graph, own(&[("/a", 200), ("/b", 100)]));
        let b = calc.effective(Path::new("/b"));
        assert_eq!(b.timestamp, 200);
        assert_eq!(b.hash, "/a@200");
    }

    #[test]
    fn propagates_through_two_hops() {
        let graph = deps(&[("/a", &[]), ("/b", &["/a"]), ("/c", &["/b"])]);
        let mut calc = EffectiveTimestampCalculator::new(
            &graph,
            own(&[("/a", 300), ("/b", 100), ("/c", 50)]),
        );
        assert_eq!(calc.effective(Path::new("/c")).timestamp, 300);
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        let graph = deps(&[("/a", &[]), ("/b", &[]), ("/c", &["/a", "/b"])]);
        let mut calc = EffectiveTimestampCalculator::new(
            &graph,
            own(&[("/a", 100), ("/b", 100), ("/c", 100)]),
        );
        assert_eq!(calc.effective(Path::new("/c")).hash, "/c@100");

        let mut calc = EffectiveTimestampCalculator::new(
            &graph,
            own(&[("/a", 200), ("/b", 200), ("/c", 100)]),
        );
        assert_eq!(calc.effective(Path::new("/c")).hash, "/a@200");
    }

    #[test]
    fn compute_all_covers_every_app() {
        let graph = deps(&[("/a", &["/libs/x"]), ("/b", &["/a"])]);
        let mut own = own(&[("/a", 10), ("/b", 20), ("/libs/x", 30)]);
        own.insert(PathBuf::from("/unused"), CommitInfo::new("u", 99));

        let all = EffectiveTimestampCalculator::new(&graph, own).compute_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[Path::new("/a")].timestamp, 30);
        assert_eq!(all[Path::new("/b")].timestamp, 30);
    }

    #[tokio::test]
    async fn dependency_only_paths_are_fetched_lazily() {
        let graph = deps(&[("/a", &["/libs/x", "/libs/broken"])]);
        let source: Arc<dyn CommitSource> =
            Arc::new(StaticCommitSource::new().with_commit("/libs/x", CommitInfo::new("x", 500)));

        let mut calc = EffectiveTimestampCalculator::new(&graph, own(&[("/a", 100)]));
        assert_eq!(
            calc.missing_paths(),
            vec![PathBuf::from("/libs/broken"), PathBuf::from("/libs/x")]
        );

        calc.fetch_missing(source, 4).await;
        let a = calc.effective(Path::new("/a"));
        assert_eq!(a, CommitInfo::new("x", 500));
    }

    #[tokio::test]
    async fn failed_fetch_counts_as_timestamp_zero() {
        let graph = deps(&[("/a", &["/libs/broken"])]);
        let source: Arc<dyn CommitSource> = Arc::new(StaticCommitSource::new());

        let mut calc = EffectiveTimestampCalculator::new(&graph, own(&[("/a", 100)]));
        calc.fetch_missing(source, 1).await;
        assert_eq!(calc.effective(Path::new("/a")).timestamp, 100);
        assert_eq!(calc.effective(Path::new("/libs/broken")), CommitInfo::unknown());
    }
}
