//! Pipeline task repository functions.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{DbError, models::PipelineTaskRow};

const TASK_COLUMNS: &str = "id, pipeline_run_id, tenant_id, task_id, position, status, \
     start_time, end_time, error_message, logs, created_at, updated_at";

/// Insert a task record.
pub async fn insert_task<'e, E>(executor: E, row: &PipelineTaskRow) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO pipeline_tasks
            (id, pipeline_run_id, tenant_id, task_id, position, status,
             start_time, end_time, error_message, logs, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(row.id)
    .bind(row.pipeline_run_id)
    .bind(row.tenant_id)
    .bind(&row.task_id)
    .bind(row.position)
    .bind(&row.status)
    .bind(row.start_time)
    .bind(row.end_time)
    .bind(&row.error_message)
    .bind(&row.logs)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// All task records of a run, in DAG order.
pub async fn list_tasks_for_run<'e, E>(
    executor: E,
    tenant_id: Uuid,
    run_id: Uuid,
) -> Result<Vec<PipelineTaskRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, PipelineTaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM pipeline_tasks \
         WHERE pipeline_run_id = $1 AND tenant_id = $2 ORDER BY position ASC"
    ))
    .bind(run_id)
    .bind(tenant_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Fetch a single task record by its primary key.
pub async fn get_task<'e, E>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Option<PipelineTaskRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, PipelineTaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM pipeline_tasks WHERE id = $1 AND tenant_id = $2"
    ))
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Persist the mutable columns of a task record.
pub async fn update_task<'e, E>(executor: E, row: &PipelineTaskRow) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE pipeline_tasks
        SET status = $1, start_time = $2, end_time = $3, error_message = $4, logs = $5,
            updated_at = $6
        WHERE id = $7 AND tenant_id = $8
        "#,
    )
    .bind(&row.status)
    .bind(row.start_time)
    .bind(row.end_time)
    .bind(&row.error_message)
    .bind(&row.logs)
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
