//! CRUD (Create, Read, Update, Delete) query implementations.
//!
//! Every write is a single statement with `RETURNING`, so the row handed back
//! to the caller is exactly what was committed.

use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;

use taskplatform_storage::{NewTask, StorageError, Task, TaskId, TaskPatch, TaskStatus};

use crate::error::map_sqlx_error;

const TASK_COLUMNS: &str = "id, title, description, status, created_at, updated_at";

/// A `tasks` row as decoded by sqlx.
pub(crate) type TaskRow = (
    i64,
    String,
    Option<String>,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// Converts chrono DateTime to time OffsetDateTime.
fn chrono_to_time(dt: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(dt.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
        + time::Duration::nanoseconds(dt.timestamp_subsec_nanos() as i64)
}

pub(crate) fn row_to_task(row: TaskRow) -> Result<Task, StorageError> {
    let (id, title, description, status, created_at, updated_at) = row;
    let status: TaskStatus = status
        .parse()
        .map_err(|e| StorageError::internal(format!("Corrupt status in row {id}: {e}")))?;

    Ok(Task {
        id,
        title,
        description,
        status,
        created_at: chrono_to_time(created_at),
        updated_at: chrono_to_time(updated_at),
    })
}

/// Returns every task, newest first.
pub async fn list(pool: &PgPool) -> Result<Vec<Task>, StorageError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC, id DESC");

    let rows: Vec<TaskRow> = query_as(&sql)
        .fetch_all(pool)
        .await
        .map_err(|e| map_sqlx_error("Failed to list tasks", e))?;

    rows.into_iter().map(row_to_task).collect()
}

/// Reads a task by id. Returns `None` if it doesn't exist.
pub async fn read(pool: &PgPool, id: TaskId) -> Result<Option<Task>, StorageError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1");

    let row: Option<TaskRow> = query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx_error("Failed to read task", e))?;

    row.map(row_to_task).transpose()
}

/// Inserts a task. Id, status default and timestamps come from the database.
pub async fn create(pool: &PgPool, draft: &NewTask) -> Result<Task, StorageError> {
    let title = draft.title()?;
    let sql = format!(
        "INSERT INTO tasks (title, description) VALUES ($1, $2) RETURNING {TASK_COLUMNS}"
    );

    let row: TaskRow = query_as(&sql)
        .bind(title)
        .bind(draft.description.as_deref())
        .fetch_one(pool)
        .await
        .map_err(|e| map_sqlx_error("Failed to create task", e))?;

    row_to_task(row)
}

/// Applies the provided fields and bumps `updated_at`.
/// Returns `None` if no task has this id.
pub async fn update(
    pool: &PgPool,
    id: TaskId,
    patch: &TaskPatch,
) -> Result<Option<Task>, StorageError> {
    let sql = format!(
        r#"UPDATE tasks
           SET title = COALESCE($1, title),
               description = COALESCE($2, description),
               status = COALESCE($3, status),
               updated_at = NOW()
           WHERE id = $4
           RETURNING {TASK_COLUMNS}"#
    );

    let row: Option<TaskRow> = query_as(&sql)
        .bind(patch.title.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.status.map(|s| s.as_str()))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx_error("Failed to update task", e))?;

    row.map(row_to_task).transpose()
}

/// Deletes a task and returns the removed row.
/// Returns `None` if no task has this id.
pub async fn delete(pool: &PgPool, id: TaskId) -> Result<Option<Task>, StorageError> {
    let sql = format!("DELETE FROM tasks WHERE id = $1 RETURNING {TASK_COLUMNS}");

    let row: Option<TaskRow> = query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx_error("Failed to delete task", e))?;

    row.map(row_to_task).transpose()
}

/// Liveness probe.
pub async fn ping(pool: &PgPool) -> Result<(), StorageError> {
    query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("Health check failed", e))?;
    Ok(())
}
