//! Pipeline CRUD operations.
//!
//! Every read filters on `tenant_id` and skips soft-deleted rows.

use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::{DbError, models::PipelineRow};

const PIPELINE_COLUMNS: &str = "id, tenant_id, name, description, dag_definition, schedule, \
     enabled, owner_id, deleted_at, created_at, updated_at";

/// Insert a new pipeline.
///
/// Returns `DbError::Conflict` when the tenant already has a live pipeline
/// with the same name.
pub async fn insert_pipeline(pool: &PgPool, row: &PipelineRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO pipelines
            (id, tenant_id, name, description, dag_definition, schedule,
             enabled, owner_id, deleted_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(row.id)
    .bind(row.tenant_id)
    .bind(&row.name)
    .bind(&row.description)
    .bind(&row.dag_definition)
    .bind(&row.schedule)
    .bind(row.enabled)
    .bind(row.owner_id)
    .bind(row.deleted_at)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await
    .map_err(|e| DbError::from_write(e, &format!("pipeline name '{}' is taken", row.name)))?;

    Ok(())
}

/// Fetch a live pipeline by its primary key.
pub async fn get_pipeline<'e, E>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Option<PipelineRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, PipelineRow>(&format!(
        "SELECT {PIPELINE_COLUMNS} FROM pipelines \
         WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL"
    ))
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Fetch a live pipeline by name.
pub async fn get_pipeline_by_name(
    pool: &PgPool,
    tenant_id: Uuid,
    name: &str,
) -> Result<Option<PipelineRow>, DbError> {
    let row = sqlx::query_as::<_, PipelineRow>(&format!(
        "SELECT {PIPELINE_COLUMNS} FROM pipelines \
         WHERE tenant_id = $1 AND name = $2 AND deleted_at IS NULL"
    ))
    .bind(tenant_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Return one page of live pipelines (newest first) plus the total count.
pub async fn list_pipelines(
    pool: &PgPool,
    tenant_id: Uuid,
    enabled_only: bool,
    offset: i64,
    limit: i64,
) -> Result<(Vec<PipelineRow>, i64), DbError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM pipelines
        WHERE tenant_id = $1 AND deleted_at IS NULL AND ($2 = FALSE OR enabled)
        "#,
    )
    .bind(tenant_id)
    .bind(enabled_only)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, PipelineRow>(&format!(
        "SELECT {PIPELINE_COLUMNS} FROM pipelines \
         WHERE tenant_id = $1 AND deleted_at IS NULL AND ($2 = FALSE OR enabled) \
         ORDER BY created_at DESC OFFSET $3 LIMIT $4"
    ))
    .bind(tenant_id)
    .bind(enabled_only)
    .bind(offset)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok((rows, total))
}

/// Overwrite the mutable columns of a pipeline.
///
/// Soft deletion is an update that sets `deleted_at`.
/// Returns `DbError::NotFound` if no live row matched.
pub async fn update_pipeline(pool: &PgPool, row: &PipelineRow) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE pipelines
        SET description = $1, dag_definition = $2, schedule = $3, enabled = $4,
            deleted_at = $5, updated_at = $6
        WHERE id = $7 AND tenant_id = $8 AND deleted_at IS NULL
        "#,
    )
    .bind(&row.description)
    .bind(&row.dag_definition)
    .bind(&row.schedule)
    .bind(row.enabled)
    .bind(row.deleted_at)
    .bind(row.updated_at)
    .bind(row.id)
    .bind(row.tenant_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
