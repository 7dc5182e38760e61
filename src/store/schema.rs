//! Schema for the `offline_tasks` table.
//!
//! Creation is idempotent and runs every time a store connects; there is only one table,
//! so there is no version ledger.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;

const CREATE_TASKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS offline_tasks (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NULL,
    task_type TEXT NOT NULL,
    version INTEGER NOT NULL,
    scheduled_at INTEGER NOT NULL,
    requested_at INTEGER NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_attempted_at INTEGER NULL,
    blocking INTEGER NOT NULL DEFAULT 0,
    data BLOB NOT NULL
)
"#;

const CREATE_SCHEDULED_AT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_offline_tasks_scheduled_at
    ON offline_tasks (scheduled_at)
"#;

pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(CREATE_TASKS_TABLE).execute(pool).await?;
    sqlx::query(CREATE_SCHEDULED_AT_INDEX).execute(pool).await?;
    debug!("offline_tasks schema ready");
    Ok(())
}
