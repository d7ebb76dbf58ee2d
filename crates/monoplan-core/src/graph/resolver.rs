//! Dependency resolution.
//!
//! A repo-root-anchored spec is joined with the repository root; any other
//! spec is joined with the owning app's path. Both are then normalized
//! lexically and checked against the filesystem.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::domain::{AppCatalog, DependencySpec};
use crate::error::{PlanError, PlanResult};

/// A dependency after resolution. `resolved` exists and differs from `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDependency {
    pub owner: PathBuf,
    pub spec: DependencySpec,
    pub resolved: PathBuf,
}

/// App path → its resolved dependencies, in declaration order.
///
/// Every app in the catalog has an entry, even with no dependencies.
pub type DependencyMap = BTreeMap<PathBuf, Vec<ResolvedDependency>>;

/// Resolves raw dependency specs against the repository root.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    repo_root: PathBuf,
}

impl DependencyResolver {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// The path a spec points to for `owner`, without validation.
    pub fn resolve_spec(&self, owner: &Path, spec: &DependencySpec) -> PathBuf {
        match spec {
            DependencySpec::RepoRootRelative(rel) => anchor_path(&self.repo_root, rel),
            DependencySpec::AppRelative(rel) => normalize_path(&owner.join(rel)),
        }
    }

    /// Resolve and validate every dependency of every app in `catalog`.
    ///
    /// `catalog` must already be anchored at the same root (see
    /// [`AppCatalog::anchored`]) so that app keys and resolved targets compare
    /// equal.
    pub fn resolve(&self, catalog: &AppCatalog) -> PlanResult<DependencyMap> {
        let mut map = DependencyMap::new();

        for app in catalog.iter() {
            let owner = &app.path;
            let mut resolved = Vec::with_capacity(app.depends_on.len());

            for spec in &app.depends_on {
                let target = self.resolve_spec(&app.path, spec);
                if &target == owner {
                    return Err(PlanError::SelfDependency {
                        app: app.path.clone(),
                    });
                }
                if !target.exists() {
                    return Err(PlanError::DependencyNotFound {
                        app: app.path.clone(),
                        dependency: target,
                    });
                }
                debug!(app = %app.path.display(), spec = %spec, resolved = %target.display(), "resolved dependency");
                resolved.push(ResolvedDependency {
                    owner: app.path.clone(),
                    spec: spec.clone(),
                    resolved: target,
                });
            }

            map.insert(app.path.clone(), resolved);
        }

        Ok(map)
    }
}

/// `path` in the repository's namespace: relative paths are taken from
/// `repo_root`, absolute paths are kept, and the result is normalized.
pub fn anchor_path(repo_root: &Path, path: &Path) -> PathBuf {
    normalize_path(&repo_root.join(path))
}

/// Fold `.` and `..` components and drop trailing separators.
///
/// Purely lexical: symlinks are not consulted. `..` never climbs above a
/// root, and leading `..` components of a relative path are kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}
