//! Pipeline run repository functions.

use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::{DbError, models::PipelineRunRow};

const RUN_COLUMNS: &str = "id, pipeline_id, tenant_id, status, trigger_type, parameters, \
     dag_snapshot, start_time, end_time, error_message, triggered_by, created_at, updated_at";

/// Insert a run row. Callers pair this with the task inserts in one
/// transaction.
pub async fn insert_run<'e, E>(executor: E, row: &PipelineRunRow) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO pipeline_runs
            (id, pipeline_id, tenant_id, status, trigger_type, parameters, dag_snapshot,
             start_time, end_time, error_message, triggered_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(row.id)
    .bind(row.pipeline_id)
    .bind(row.tenant_id)
    .bind(&row.status)
    .bind(&row.trigger_type)
    .bind(&row.parameters)
    .bind(&row.dag_snapshot)
    .bind(row.start_time)
    .bind(row.end_time)
    .bind(&row.error_message)
    .bind(row.triggered_by)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Fetch a run by id.
pub async fn get_run<'e, E>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Option<PipelineRunRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM pipeline_runs WHERE id = $1 AND tenant_id = $2"
    ))
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Fetch a run and hold a row lock on it until the surrounding transaction
/// ends. Concurrent status reports for the same run queue up here.
pub async fn lock_run<'e, E>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Option<PipelineRunRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM pipeline_runs WHERE id = $1 AND tenant_id = $2 FOR UPDATE"
    ))
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Persist the mutable columns of a run (status, timestamps, error).
pub async fn update_run<'e, E>(executor: E, row: &PipelineRunRow) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE pipeline_runs
        SET status = $1, start_time = $2, end_time = $3, error_message = $4, updated_at = $5
        WHERE id = $6 AND tenant_id = $7
        "#,
    )
    .bind(&row.status)
    .bind(row.start_time)
    .bind(row.end_time)
    .bind(&row.error_message)
    .bind(row.updated_at)
    .bind(row.id)
    .bind(row.tenant_id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Return one page of runs (newest first) plus the total count.
pub async fn list_runs(
    pool: &PgPool,
    tenant_id: Uuid,
    pipeline_id: Option<Uuid>,
    status: Option<&str>,
    offset: i64,
    limit: i64,
) -> Result<(Vec<PipelineRunRow>, i64), DbError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM pipeline_runs
        WHERE tenant_id = $1
          AND ($2::uuid IS NULL OR pipeline_id = $2)
          AND ($3::text IS NULL OR status = $3)
        "#,
    )
    .bind(tenant_id)
    .bind(pipeline_id)
    .bind(status)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM pipeline_runs \
         WHERE tenant_id = $1 \
           AND ($2::uuid IS NULL OR pipeline_id = $2) \
           AND ($3::text IS NULL OR status = $3) \
         ORDER BY created_at DESC OFFSET $4 LIMIT $5"
    ))
    .bind(tenant_id)
    .bind(pipeline_id)
    .bind(status)
    .bind(offset)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok((rows, total))
}

/// Oldest `PENDING` runs across every tenant, for background workers.
pub async fn list_pending_runs(pool: &PgPool, limit: i64) -> Result<Vec<PipelineRunRow>, DbError> {
    let rows = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM pipeline_runs \
         WHERE status = 'PENDING' ORDER BY created_at ASC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
