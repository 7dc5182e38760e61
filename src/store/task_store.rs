use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::{debug, info, instrument};

use crate::config::StoreConfig;
use crate::error::{QueueError, Result};
use crate::models::{Task, TaskType};
use crate::store::schema;

const SELECT_TASK_COLUMNS: &str = "SELECT id, name, task_type, version, scheduled_at, requested_at, \
     attempts, last_attempted_at, blocking, data FROM offline_tasks";

/// Row as stored; timestamps are epoch milliseconds
#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    name: Option<String>,
    task_type: String,
    version: i64,
    scheduled_at: i64,
    requested_at: i64,
    attempts: i64,
    last_attempted_at: Option<i64>,
    blocking: bool,
    data: Vec<u8>,
}

impl TryFrom<TaskRow> for Task {
    type Error = QueueError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            scheduled_at: from_millis(row.scheduled_at, "scheduled_at")?,
            requested_at: from_millis(row.requested_at, "requested_at")?,
            last_attempted_at: row
                .last_attempted_at
                .map(|ms| from_millis(ms, "last_attempted_at"))
                .transpose()?,
            attempts: u32::try_from(row.attempts.max(0)).unwrap_or(u32::MAX),
            task_type: TaskType::from(row.task_type),
            id: row.id,
            name: row.name,
            version: row.version,
            blocking: row.blocking,
            data: row.data,
        })
    }
}

fn from_millis(ms: i64, column: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        QueueError::StorageError(sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: format!("timestamp {ms} out of range").into(),
        })
    })
}

fn into_tasks(rows: Vec<TaskRow>) -> Result<Vec<Task>> {
    rows.into_iter().map(Task::try_from).collect()
}

/// Handle to the durable task queue. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    /// Open (creating if needed) the database named by `config` and ensure the schema
    #[instrument(skip(config), fields(database_url = %config.database_url))]
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = if config.is_in_memory() {
            // Each in-memory connection is a separate database, so keep exactly one alive
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(&config.database_url)
                .await?
        } else {
            let options = SqliteConnectOptions::from_str(&config.database_url)?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await?
        };

        Self::from_pool(pool).await
    }

    /// Private in-memory store
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&StoreConfig::in_memory()).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        schema::ensure_schema(&pool).await?;
        info!("task store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a transactional context for mutations
    pub async fn context(&self) -> Result<StoreContext> {
        let tx = self.pool.begin().await?;
        Ok(StoreContext { tx })
    }

    #[instrument(skip(self))]
    pub async fn find_task(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!("{SELECT_TASK_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    /// Tasks due at or before `before`, oldest schedule first
    #[instrument(skip(self), fields(before = %before))]
    pub async fn next_ready_tasks(&self, before: DateTime<Utc>, limit: u32) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{SELECT_TASK_COLUMNS} WHERE scheduled_at <= ? \
             ORDER BY scheduled_at ASC, requested_at ASC LIMIT ?"
        ))
        .bind(before.timestamp_millis())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let tasks = into_tasks(rows)?;
        debug!(ready_count = tasks.len(), "Fetched ready tasks");
        Ok(tasks)
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offline_tasks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Every stored task in schedule order
    pub async fn all_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{SELECT_TASK_COLUMNS} ORDER BY scheduled_at ASC, requested_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        into_tasks(rows)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Transactional scope over the task table.
///
/// Mutations become durable only through [`StoreContext::save`]. Holding a context pins a
/// pool connection, so avoid pool-level reads on [`TaskStore`] while one is open against
/// an in-memory store.
pub struct StoreContext {
    tx: Transaction<'static, Sqlite>,
}

impl StoreContext {
    #[instrument(skip(self, task), fields(task_id = %task.id, task_type = %task.task_type))]
    pub async fn create(&mut self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO offline_tasks
                (id, name, task_type, version, scheduled_at, requested_at,
                 attempts, last_attempted_at, blocking, data)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(&task.name)
        .bind(task.task_type.as_str())
        .bind(task.version)
        .bind(task.scheduled_at.timestamp_millis())
        .bind(task.requested_at.timestamp_millis())
        .bind(i64::from(task.attempts))
        .bind(task.last_attempted_at.map(|at| at.timestamp_millis()))
        .bind(task.blocking)
        .bind(&task.data)
        .execute(&mut *self.tx)
        .await?;

        debug!("Task created");
        Ok(())
    }

    /// Write back scheduling metadata; returns whether the row still existed.
    ///
    /// The payload column is not touched.
    #[instrument(skip(self, task), fields(task_id = %task.id, attempts = task.attempts))]
    pub async fn update(&mut self, task: &Task) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE offline_tasks
            SET name = ?, scheduled_at = ?, attempts = ?, last_attempted_at = ?, blocking = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.name)
        .bind(task.scheduled_at.timestamp_millis())
        .bind(i64::from(task.attempts))
        .bind(task.last_attempted_at.map(|at| at.timestamp_millis()))
        .bind(task.blocking)
        .bind(&task.id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a task; a missing row is not an error
    #[instrument(skip(self))]
    pub async fn delete(&mut self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM offline_tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        let deleted = result.rows_affected() > 0;
        if !deleted {
            debug!(task_id = %id, "Delete of missing task ignored");
        }
        Ok(deleted)
    }

    pub async fn delete_all(&mut self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM offline_tasks")
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_task(&mut self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!("{SELECT_TASK_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(Task::try_from).transpose()
    }

    pub async fn count(&mut self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offline_tasks")
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Commit every mutation made through this context
    pub async fn save(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
