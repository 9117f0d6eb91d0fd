//! Workflow metadata operations.

use chrono::Utc;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::{DbError, models::WorkflowRow};

/// Insert a workflow row, or refresh `name`, `klass` and `stopped` if the id
/// already exists.
pub async fn upsert_workflow<'e, E>(
    executor: E,
    id: Uuid,
    name: &str,
    klass: &str,
    stopped: bool,
) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workflows (id, name, klass, stopped, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name, klass = EXCLUDED.klass, stopped = EXCLUDED.stopped
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(klass)
    .bind(stopped)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(())
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    sqlx::query_as::<_, WorkflowRow>(
        r#"SELECT id, name, klass, stopped, created_at FROM workflows WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

pub async fn workflow_exists(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"SELECT EXISTS (SELECT 1 FROM workflows WHERE id = $1)"#,
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Set the `stopped` flag.
///
/// Returns `DbError::NotFound` if no row was updated.
pub async fn set_stopped(pool: &PgPool, id: Uuid, stopped: bool) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE workflows SET stopped = $1 WHERE id = $2")
        .bind(stopped)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
