//! Job state operations.
//!
//! `claim_job` is the dispatch guard: a conditional `UPDATE` from `pending`
//! to `enqueued`.  Postgres row locking guarantees only one concurrent
//! caller sees an affected row.  `release_job` undoes a claim whose push
//! failed.

use engine::JobStatus;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::{DbError, models::JobRow};

/// Insert a job unless `(workflow_id, name)` already exists.
pub async fn insert_job_if_absent<'e, E>(executor: E, row: &JobRow) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workflow_jobs
            (workflow_id, position, name, klass, status, incoming, outgoing, params, started_at, finished_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (workflow_id, name) DO NOTHING
        "#,
    )
    .bind(row.workflow_id)
    .bind(row.position)
    .bind(&row.name)
    .bind(&row.klass)
    .bind(&row.status)
    .bind(&row.incoming)
    .bind(&row.outgoing)
    .bind(&row.params)
    .bind(row.started_at)
    .bind(row.finished_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// All jobs of a workflow in declaration order.
pub async fn list_jobs(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<JobRow>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT workflow_id, position, name, klass, status, incoming, outgoing, params, started_at, finished_at
        FROM workflow_jobs
        WHERE workflow_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get_job(pool: &PgPool, workflow_id: Uuid, name: &str) -> Result<JobRow, DbError> {
    sqlx::query_as::<_, JobRow>(
        r#"
        SELECT workflow_id, position, name, klass, status, incoming, outgoing, params, started_at, finished_at
        FROM workflow_jobs
        WHERE workflow_id = $1 AND name = $2
        "#,
    )
    .bind(workflow_id)
    .bind(name)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Overwrite the lifecycle columns of an existing job.
///
/// Returns `DbError::NotFound` if no row was updated.
pub async fn update_job_state(pool: &PgPool, row: &JobRow) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_jobs
        SET status = $3, started_at = $4, finished_at = $5
        WHERE workflow_id = $1 AND name = $2
        "#,
    )
    .bind(row.workflow_id)
    .bind(&row.name)
    .bind(&row.status)
    .bind(row.started_at)
    .bind(row.finished_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Move a job from `pending` to `enqueued`; `true` iff this call did it.
pub async fn claim_job(pool: &PgPool, workflow_id: Uuid, name: &str) -> Result<bool, DbError> {
    swap_status(pool, workflow_id, name, JobStatus::Pending, JobStatus::Enqueued).await
}

/// Move a job from `enqueued` back to `pending`; `true` iff this call did it.
pub async fn release_job(pool: &PgPool, workflow_id: Uuid, name: &str) -> Result<bool, DbError> {
    swap_status(pool, workflow_id, name, JobStatus::Enqueued, JobStatus::Pending).await
}

/// Compare-and-set on the status column.  Status text is bound from
/// `JobStatus`'s `Display`, the same form `JobRow` stores.
async fn swap_status(
    pool: &PgPool,
    workflow_id: Uuid,
    name: &str,
    from: JobStatus,
    to: JobStatus,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_jobs
        SET status = $4
        WHERE workflow_id = $1 AND name = $2 AND status = $3
        "#,
    )
    .bind(workflow_id)
    .bind(name)
    .bind(from.to_string())
    .bind(to.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Publish `payload` on a `LISTEN`/`NOTIFY` channel.
pub async fn notify(pool: &PgPool, channel: &str, payload: &str) -> Result<(), DbError> {
    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(channel)
        .bind(payload)
        .execute(pool)
        .await?;
    Ok(())
}
