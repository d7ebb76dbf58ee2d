//! Where the execution-state store lives and how to reach it.
//!
//! [`StoreConfig::from_env`] picks, in order:
//! 1. a remote server with credentials (`SURREALDB_ENDPOINT`, `SURREALDB_USERNAME`,
//!    `SURREALDB_PASSWORD`),
//! 2. a bare connection string in `SURREALDB_URL`,
//! 3. a SurrealKV directory under `.monoplan/state`.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::info;

use crate::error::StateError;
use crate::migrations;
use crate::Result;

const DEFAULT_NAMESPACE: &str = "monoplan";
const DEFAULT_DATABASE: &str = "main";
const LOCAL_STATE_DIR: &str = ".monoplan/state";

/// Which user the remote server authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScope {
    /// Server-wide root user.
    Root,
    /// User defined on the target database.
    Database,
}

/// A shared state server reached over WebSocket, e.g. one instance serving
/// every CI runner of a repository.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    pub scope: AuthScope,
}

impl CloudConfig {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            scope: AuthScope::Database,
        }
    }

    pub fn in_database(mut self, namespace: impl Into<String>, database: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self.database = database.into();
        self
    }

    pub fn with_scope(mut self, scope: AuthScope) -> Self {
        self.scope = scope;
        self
    }

    /// Read the remote configuration, or `None` when any credential is unset.
    ///
    /// `SURREALDB_NAMESPACE` / `SURREALDB_DATABASE` override the defaults and
    /// `SURREALDB_ROOT=true` selects root authentication.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok();

        let mut config = Self::new(
            var("SURREALDB_ENDPOINT")?,
            var("SURREALDB_USERNAME")?,
            var("SURREALDB_PASSWORD")?,
        );
        if let Some(ns) = var("SURREALDB_NAMESPACE") {
            config.namespace = ns;
        }
        if let Some(db) = var("SURREALDB_DATABASE") {
            config.database = db;
        }
        if var("SURREALDB_ROOT").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            config.scope = AuthScope::Root;
        }
        Some(config)
    }

    async fn sign_in(&self, db: &Surreal<Any>) -> Result<()> {
        let signed_in = match self.scope {
            AuthScope::Root => db
                .signin(Root {
                    username: &self.username,
                    password: &self.password,
                })
                .await
                .map(|_| ()),
            AuthScope::Database => db
                .signin(Database {
                    namespace: &self.namespace,
                    database: &self.database,
                    username: &self.username,
                    password: &self.password,
                })
                .await
                .map(|_| ()),
        };
        signed_in.map_err(|e| {
            StateError::Connection(format!("{:?} sign-in to {} failed: {e}", self.scope, self.endpoint))
        })
    }
}

/// Connection target for the state store.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Cloud(CloudConfig),
    /// Any connection string SurrealDB understands (`mem://`, `ws://…`, `surrealkv://…`).
    Url(String),
}

impl StoreConfig {
    /// Throwaway in-process store.
    pub fn in_memory() -> Self {
        StoreConfig::Url("mem://".to_string())
    }

    pub fn from_env() -> Self {
        if let Some(cloud) = CloudConfig::from_env() {
            return StoreConfig::Cloud(cloud);
        }
        match std::env::var("SURREALDB_URL") {
            Ok(url) => StoreConfig::Url(url),
            Err(_) => StoreConfig::Url(format!("surrealkv://{LOCAL_STATE_DIR}")),
        }
    }

    fn namespace_and_database(&self) -> (&str, &str) {
        match self {
            StoreConfig::Cloud(cloud) => (&cloud.namespace, &cloud.database),
            StoreConfig::Url(_) => (DEFAULT_NAMESPACE, DEFAULT_DATABASE),
        }
    }
}

/// Open the store described by `config` and make sure `job_state` exists.
pub async fn connect(config: &StoreConfig) -> Result<Surreal<Any>> {
    let target = match config {
        StoreConfig::Cloud(cloud) => cloud.endpoint.as_str(),
        StoreConfig::Url(url) => url.as_str(),
    };

    if let Some(dir) = target.strip_prefix("surrealkv://") {
        std::fs::create_dir_all(dir).map_err(|e| {
            StateError::Connection(format!("cannot create state directory {dir}: {e}"))
        })?;
    }

    let db = surrealdb::engine::any::connect(target)
        .await
        .map_err(|e| StateError::Connection(format!("cannot reach {target}: {e}")))?;

    if let StoreConfig::Cloud(cloud) = config {
        cloud.sign_in(&db).await?;
    }

    let (ns, database) = config.namespace_and_database();
    db.use_ns(ns)
        .use_db(database)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    info!(target = %target, namespace = ns, database, "state store connected");
    Ok(db)
}
