//! SurrealDB schema initialization for the execution-state table.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Name of the table holding execution-state records.
pub const STATE_TABLE: &str = "job_state";

/// Initialize all monoplan tables in SurrealDB.
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing monoplan SurrealDB schema");
    init_job_state_table(db).await?;
    info!("monoplan schema initialization complete");
    Ok(())
}

/// Initialize `job_state` table
///
/// Schema:
/// ```text
/// TABLE job_state {
///   id:          [pk, sk] (record id; one row per key)
///   pk:          STRING   STATE#<correlationKey> (indexed)
///   sk:          STRING   <appPath>#<jobKey>#<status>
///   appPath:     STRING
///   jobKey:      STRING
///   jobStatus:   STRING   (running | success)
///   commitTs:    INT      epoch seconds
///   commitHash:  STRING
///   ttl:         INT      epoch seconds (indexed, drives purge)
/// }
/// ```
///
/// Keying rows by `[pk, sk]` is what makes the conditional writes in
/// [`crate::SurrealStateStore`] address exactly one record.
async fn init_job_state_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing job_state table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS job_state SCHEMALESS;

        -- Partition scans for skip-set queries
        DEFINE INDEX IF NOT EXISTS idx_job_state_pk ON TABLE job_state COLUMNS pk;

        -- Expiry sweeps
        DEFINE INDEX IF NOT EXISTS idx_job_state_ttl ON TABLE job_state COLUMNS ttl;
    "#;

    db.query(sql)
        .await
        .and_then(|res| res.check())
        .map_err(|e| StateError::SchemaSetup(format!("job_state: {e}")))?;
    info!("job_state table initialized");
    Ok(())
}
