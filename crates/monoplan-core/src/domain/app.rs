//! App and job declarations.
//!
//! Declarations are produced by an external loader and arrive here already
//! validated, usually as a JSON snapshot:
//!
//! ```json
//! [{
//!   "path": "apps/web",
//!   "dependsOn": ["../shared", "$repoRoot/libs/ui"],
//!   "jobs": {
//!     "build": { "on": { "push": { "branches": ["main"] } }, "configs": { "docker_build": {} } }
//!   }
//! }]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PlanResult;
use crate::graph::{anchor_path, normalize_path};

/// Marker that anchors a dependency spec at the repository root.
pub const REPO_ROOT_MARKER: &str = "$repoRoot/";

/// A raw dependency reference, classified once when it is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DependencySpec {
    /// `$repoRoot/<path>`: joined with the repository root.
    RepoRootRelative(PathBuf),
    /// Anything else: joined with the owning app's path.
    AppRelative(PathBuf),
}

impl DependencySpec {
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix(REPO_ROOT_MARKER) {
            Some(rest) => DependencySpec::RepoRootRelative(PathBuf::from(rest)),
            None => DependencySpec::AppRelative(PathBuf::from(spec)),
        }
    }
}

impl From<String> for DependencySpec {
    fn from(spec: String) -> Self {
        DependencySpec::parse(&spec)
    }
}

impl From<DependencySpec> for String {
    fn from(spec: DependencySpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencySpec::RepoRootRelative(p) => write!(f, "{REPO_ROOT_MARKER}{}", p.display()),
            DependencySpec::AppRelative(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Branch restriction for one event name. `branches: None` means any branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<String>>,
}

/// Event name → trigger. A `null` trigger body deserializes to "any branch".
pub type TriggerSpec = BTreeMap<String, Option<EventTrigger>>;

/// One job declared by an app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDeclaration {
    #[serde(default)]
    pub on: TriggerSpec,
    #[serde(default)]
    pub configs: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A validated app declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDeclaration {
    /// Directory of the app; also its identity.
    pub path: PathBuf,
    #[serde(default)]
    pub depends_on: Vec<DependencySpec>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub jobs: BTreeMap<String, JobDeclaration>,
}

impl AppDeclaration {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            depends_on: Vec::new(),
            metadata: serde_json::Value::Null,
            jobs: BTreeMap::new(),
        }
    }

    pub fn with_dependency(mut self, spec: &str) -> Self {
        self.depends_on.push(DependencySpec::parse(spec));
        self
    }

    pub fn with_job(mut self, key: impl Into<String>, job: JobDeclaration) -> Self {
        self.jobs.insert(key.into(), job);
        self
    }
}

/// Immutable snapshot of every app taking part in one run, keyed by path.
///
/// App paths are normalized on the way in so they compare equal to resolved
/// dependency paths.
#[derive(Debug, Clone, Default)]
pub struct AppCatalog {
    apps: BTreeMap<PathBuf, Arc<AppDeclaration>>,
}

impl AppCatalog {
    pub fn new(apps: impl IntoIterator<Item = AppDeclaration>) -> Self {
        Self {
            apps: apps
                .into_iter()
                .map(|mut app| {
                    app.path = normalize_path(&app.path);
                    (app.path.clone(), Arc::new(app))
                })
                .collect(),
        }
    }

    /// The same apps with every path taken relative to `repo_root`.
    ///
    /// Dependency specs anchored with `$repoRoot/` resolve under
    /// `repo_root`, so app paths must live in that namespace too.
    pub fn anchored(&self, repo_root: &Path) -> Self {
        Self {
            apps: self
                .apps
                .values()
                .map(|app| {
                    let path = anchor_path(repo_root, &app.path);
                    let app = if path == app.path {
                        Arc::clone(app)
                    } else {
                        Arc::new(AppDeclaration {
                            path: path.clone(),
                            ..AppDeclaration::clone(app)
                        })
                    };
                    (path, app)
                })
                .collect(),
        }
    }

    /// Parse a JSON array of app declarations.
    pub fn from_json(json: &str) -> PlanResult<Self> {
        let apps: Vec<AppDeclaration> = serde_json::from_str(json)?;
        Ok(Self::new(apps))
    }

    pub fn get(&self, path: &Path) -> Option<&Arc<AppDeclaration>> {
        self.apps.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.apps.contains_key(path)
    }

    /// Apps in path order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<AppDeclaration>> {
        self.apps.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.apps.keys()
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}
