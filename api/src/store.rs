use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use cadence_core::clarification::ClarificationRequest;
use cadence_core::error::codes;
use cadence_core::intervention::InterventionProposal;
use cadence_core::plan::{ItemStatus, Operation, Plan, PlanItem};
use cadence_core::preview::PreviewSet;

use crate::error::AppError;

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    user_id: Uuid,
    timezone: String,
    version: i64,
}

#[derive(sqlx::FromRow)]
struct PlanItemRow {
    id: Uuid,
    date: NaiveDate,
    title: String,
    status: String,
    tags: serde_json::Value,
}

/// Read the canonical plan with its items, sorted ascending by date.
pub async fn load_plan(pool: &PgPool, plan_id: Uuid) -> Result<Option<Plan>, AppError> {
    let Some(row) = sqlx::query_as::<_, PlanRow>(
        "SELECT id, user_id, timezone, version FROM plans WHERE id = $1",
    )
    .bind(plan_id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let item_rows = sqlx::query_as::<_, PlanItemRow>(
        "SELECT id, date, title, status, tags FROM plan_items WHERE plan_id = $1 ORDER BY date",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    let mut items = Vec::with_capacity(item_rows.len());
    for item in item_rows {
        let status = ItemStatus::parse(&item.status).ok_or_else(|| {
            AppError::Internal(format!(
                "unknown item status '{}' on item {}",
                item.status, item.id
            ))
        })?;
        let tags: Vec<String> = serde_json::from_value(item.tags).unwrap_or_default();
        items.push(PlanItem {
            id: item.id,
            date: item.date,
            title: item.title,
            status,
            tags,
        });
    }

    Ok(Some(Plan {
        id: row.id,
        user_id: row.user_id,
        version: row.version,
        timezone: row.timezone,
        items,
    }))
}

/// Current stored version, without loading the items.
pub async fn read_plan_version(pool: &PgPool, plan_id: Uuid) -> Result<Option<i64>, AppError> {
    Ok(
        sqlx::query_scalar::<_, i64>("SELECT version FROM plans WHERE id = $1")
            .bind(plan_id)
            .fetch_optional(pool)
            .await?,
    )
}

// Transient records (previews, clarifications, intervention proposals) share
// one storage shape: an id-keyed jsonb payload with a TTL. Rows a full day
// past expiry are swept on the next write to the same table.

async fn store_payload<T: serde::Serialize>(
    pool: &PgPool,
    table: &str,
    id: Uuid,
    plan_id: Uuid,
    record: &T,
    expires_at: chrono::DateTime<chrono::Utc>,
) -> Result<(), AppError> {
    let payload = serde_json::to_value(record)
        .map_err(|err| AppError::Internal(format!("failed to serialize {table} payload: {err}")))?;

    sqlx::query(&format!(
        "DELETE FROM {table} WHERE expires_at < now() - interval '1 day'"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "INSERT INTO {table} (id, plan_id, payload, expires_at) VALUES ($1, $2, $3, $4)"
    ))
    .bind(id)
    .bind(plan_id)
    .bind(&payload)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

async fn load_payload<T: serde::de::DeserializeOwned>(
    pool: &PgPool,
    table: &str,
    plan_id: Uuid,
    id: Uuid,
) -> Result<Option<T>, AppError> {
    let row: Option<(serde_json::Value,)> = sqlx::query_as(&format!(
        "SELECT payload FROM {table} WHERE id = $1 AND plan_id = $2"
    ))
    .bind(id)
    .bind(plan_id)
    .fetch_optional(pool)
    .await?;

    row.map(|(payload,)| {
        serde_json::from_value(payload)
            .map_err(|err| AppError::Internal(format!("corrupt {table} payload: {err}")))
    })
    .transpose()
}

async fn delete_payload(pool: &PgPool, table: &str, id: Uuid) -> Result<(), AppError> {
    sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn store_preview(pool: &PgPool, preview: &PreviewSet) -> Result<(), AppError> {
    store_payload(
        pool,
        "preview_sets",
        preview.id,
        preview.plan_id,
        preview,
        preview.expires_at,
    )
    .await
}

/// Load a preview for this plan. Expired previews are still returned: the
/// commit checks report expiry as its own failure code, which a silent
/// not-found would mask.
pub async fn load_preview(
    pool: &PgPool,
    plan_id: Uuid,
    preview_id: Uuid,
) -> Result<Option<PreviewSet>, AppError> {
    load_payload(pool, "preview_sets", plan_id, preview_id).await
}

pub async fn delete_preview(pool: &PgPool, preview_id: Uuid) -> Result<(), AppError> {
    delete_payload(pool, "preview_sets", preview_id).await
}

pub async fn store_clarification(
    pool: &PgPool,
    clarification: &ClarificationRequest,
) -> Result<(), AppError> {
    store_payload(
        pool,
        "clarification_requests",
        clarification.id,
        clarification.plan_id,
        clarification,
        clarification.expires_at,
    )
    .await
}

pub async fn load_clarification(
    pool: &PgPool,
    plan_id: Uuid,
    clarification_id: Uuid,
) -> Result<Option<ClarificationRequest>, AppError> {
    load_payload(pool, "clarification_requests", plan_id, clarification_id).await
}

pub async fn delete_clarification(pool: &PgPool, clarification_id: Uuid) -> Result<(), AppError> {
    delete_payload(pool, "clarification_requests", clarification_id).await
}

pub async fn store_proposal(
    pool: &PgPool,
    proposal: &InterventionProposal,
) -> Result<(), AppError> {
    store_payload(
        pool,
        "intervention_proposals",
        proposal.id,
        proposal.plan_id,
        proposal,
        proposal.expires_at,
    )
    .await
}

pub async fn load_proposal(
    pool: &PgPool,
    plan_id: Uuid,
    proposal_id: Uuid,
) -> Result<Option<InterventionProposal>, AppError> {
    load_payload(pool, "intervention_proposals", plan_id, proposal_id).await
}

pub async fn delete_proposal(pool: &PgPool, proposal_id: Uuid) -> Result<(), AppError> {
    delete_payload(pool, "intervention_proposals", proposal_id).await
}

fn constraint_conflict(err: sqlx::Error) -> AppError {
    // 23505: unique violation. Inside a commit this means a concurrent
    // writer landed between our pre-checks and the write.
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return AppError::CommitConflict {
                code: codes::DATABASE_CONFLICT,
                message: "a concurrent change collided with this commit".to_string(),
            };
        }
    }
    AppError::Database(err)
}

/// Apply a previewed change-set under optimistic concurrency.
///
/// One transaction: every item write plus a version bump conditioned on the
/// stored version still matching the version the preview captured. A losing
/// compare-and-swap aborts the whole transaction with zero partial effect.
/// The unique (plan_id, date) constraint is deferred, so a swap can pass
/// through its intermediate state inside the transaction.
pub async fn apply_commit(
    pool: &PgPool,
    plan_id: Uuid,
    preview: &PreviewSet,
) -> Result<i64, AppError> {
    let mut tx = pool.begin().await?;

    for modification in &preview.modifications {
        match modification.operation {
            Operation::Add => {
                let item = modification.added_item();
                sqlx::query(
                    "INSERT INTO plan_items (id, plan_id, date, title, status, tags) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(item.id)
                .bind(plan_id)
                .bind(item.date)
                .bind(&item.title)
                .bind(item.status.as_str())
                .bind(serde_json::json!(item.tags))
                .execute(&mut *tx)
                .await
                .map_err(constraint_conflict)?;
            }
            _ => {
                let Some(item) = modification.applied_item() else {
                    return Err(AppError::Internal(format!(
                        "modification {} has no before snapshot",
                        modification.target_item_id
                    )));
                };
                let result = sqlx::query(
                    "UPDATE plan_items SET date = $3, title = $4, status = $5, tags = $6, \
                     updated_at = now() WHERE id = $1 AND plan_id = $2",
                )
                .bind(modification.target_item_id)
                .bind(plan_id)
                .bind(item.date)
                .bind(&item.title)
                .bind(item.status.as_str())
                .bind(serde_json::json!(item.tags))
                .execute(&mut *tx)
                .await
                .map_err(constraint_conflict)?;

                if result.rows_affected() == 0 {
                    // Dropping the transaction rolls back every prior write.
                    return Err(AppError::CommitConflict {
                        code: codes::DATABASE_CONFLICT,
                        message: format!(
                            "item {} disappeared during commit",
                            modification.target_item_id
                        ),
                    });
                }
            }
        }
    }

    let bumped = sqlx::query(
        "UPDATE plans SET version = version + 1, updated_at = now() \
         WHERE id = $1 AND version = $2",
    )
    .bind(plan_id)
    .bind(preview.plan_version)
    .execute(&mut *tx)
    .await?;

    if bumped.rows_affected() == 0 {
        return Err(AppError::CommitConflict {
            code: codes::DATABASE_CONFLICT,
            message: "the plan version moved while committing; refresh and retry".to_string(),
        });
    }

    tx.commit().await?;
    Ok(preview.plan_version + 1)
}
