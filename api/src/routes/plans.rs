use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use cadence_core::commit::{CommitRequest, check_commit};
use cadence_core::error::{ApiError, codes};
use cadence_core::plan::Plan;

use crate::error::AppError;
use crate::state::AppState;
use crate::store;

pub fn read_router() -> Router<AppState> {
    Router::new().route("/v1/plans/{plan_id}", get(get_plan))
}

pub fn commit_router() -> Router<AppState> {
    Router::new().route("/v1/plans/{plan_id}/commit", post(commit_preview))
}

/// Read the canonical plan snapshot
///
/// Returns the versioned plan with its full item list. The version in this
/// snapshot is what a later commit must present.
#[utoipa::path(
    get,
    path = "/v1/plans/{plan_id}",
    params(("plan_id" = Uuid, Path, description = "Plan ID")),
    responses(
        (status = 200, description = "Canonical plan snapshot", body = Plan),
        (status = 404, description = "Plan not found", body = ApiError)
    ),
    tag = "plans"
)]
pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<Plan>, AppError> {
    let plan = store::load_plan(&state.db, plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            message: format!("no plan with id {plan_id}"),
        })?;
    Ok(Json(plan))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CommitResponse {
    pub plan_id: Uuid,
    /// The stored version after the commit: exactly previous + 1.
    pub new_version: i64,
    /// Number of items the change-set touched.
    pub applied: usize,
}

/// Commit a previewed change-set
///
/// Ordered checks, each with a distinct failure code: the preview must exist
/// for this plan, must not be expired, the confirmed id set must equal the
/// previewed set exactly, and both the preview's captured version and the
/// caller's version must match the stored one. The write itself is a single
/// compare-and-swap transaction; a losing race has zero partial effect. The
/// engine never retries a failed commit.
#[utoipa::path(
    post,
    path = "/v1/plans/{plan_id}/commit",
    params(("plan_id" = Uuid, Path, description = "Plan ID")),
    request_body = CommitRequest,
    responses(
        (status = 200, description = "Change-set applied", body = CommitResponse),
        (status = 404, description = "Plan or preview not found", body = ApiError),
        (status = 409, description = "Mismatch or version conflict", body = ApiError),
        (status = 410, description = "Preview expired", body = ApiError)
    ),
    tag = "plans"
)]
pub async fn commit_preview(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    Json(request): Json<CommitRequest>,
) -> Result<Json<CommitResponse>, AppError> {
    let current_version = store::read_plan_version(&state.db, plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            message: format!("no plan with id {plan_id}"),
        })?;

    let preview = store::load_preview(&state.db, plan_id, request.preview_id)
        .await?
        .ok_or_else(|| AppError::CommitConflict {
            code: codes::PREVIEW_NOT_FOUND,
            message: "no such preview for this plan; draft the change again".to_string(),
        })?;

    check_commit(&preview, plan_id, &request, current_version, Utc::now()).map_err(
        |rejection| AppError::CommitConflict {
            code: rejection.code(),
            message: rejection.to_string(),
        },
    )?;

    let new_version = store::apply_commit(&state.db, plan_id, &preview).await?;

    // Single-use: a committed preview can never be replayed.
    store::delete_preview(&state.db, preview.id).await?;

    tracing::info!(
        plan_id = %plan_id,
        new_version,
        applied = preview.modifications.len(),
        "committed previewed change-set"
    );

    Ok(Json(CommitResponse {
        plan_id,
        new_version,
        applied: preview.modifications.len(),
    }))
}
