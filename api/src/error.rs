use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cadence_core::error::{self, ApiError, codes};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Plan, preview, or clarification missing (404)
    NotFound { message: String },
    /// Commit refused under the concurrency taxonomy. The code decides the
    /// status: not-found 404, expired 410, everything else 409.
    CommitConflict {
        code: &'static str,
        message: String,
    },
    /// Intent drafter exceeded its deadline (504). Request state unchanged;
    /// retrying is safe.
    DrafterTimeout,
    /// Intent drafter unreachable or answered with an error (502)
    DrafterUnavailable { message: String },
    /// Intent drafter payload failed structural validation (502)
    DrafterInvalidResponse { message: String },
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::CommitConflict { code, .. } => match *code {
                codes::PREVIEW_NOT_FOUND => StatusCode::NOT_FOUND,
                codes::PREVIEW_EXPIRED => StatusCode::GONE,
                _ => StatusCode::CONFLICT,
            },
            Self::DrafterTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::DrafterUnavailable { .. } | Self::DrafterInvalidResponse { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();
        let status = self.status();

        let api_error = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => ApiError {
                error: error::codes::VALIDATION_FAILED.to_string(),
                message,
                field,
                received,
                request_id,
                docs_hint,
            },
            AppError::NotFound { message } => ApiError {
                error: error::codes::NOT_FOUND.to_string(),
                message,
                field: None,
                received: None,
                request_id,
                docs_hint: None,
            },
            AppError::CommitConflict { code, message } => ApiError {
                error: code.to_string(),
                message,
                field: None,
                received: None,
                request_id,
                docs_hint: Some(
                    "Re-read the plan, draft the change again, and commit the fresh preview. \
                     The engine never retries a commit on its own."
                        .to_string(),
                ),
            },
            AppError::DrafterTimeout => ApiError {
                error: error::codes::DRAFTER_TIMEOUT.to_string(),
                message: "The drafting service did not answer in time. Nothing was applied."
                    .to_string(),
                field: None,
                received: None,
                request_id,
                docs_hint: Some("Retry the same request; request state was left unchanged.".to_string()),
            },
            AppError::DrafterUnavailable { message } => ApiError {
                error: error::codes::DRAFTER_UNAVAILABLE.to_string(),
                message,
                field: None,
                received: None,
                request_id,
                docs_hint: Some("Retry the same request; request state was left unchanged.".to_string()),
            },
            AppError::DrafterInvalidResponse { message } => ApiError {
                error: error::codes::DRAFTER_INVALID_RESPONSE.to_string(),
                message,
                field: None,
                received: None,
                request_id,
                docs_hint: None,
            },
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                ApiError {
                    error: error::codes::INTERNAL_ERROR.to_string(),
                    message: "An internal error occurred".to_string(),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                }
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ApiError {
                    error: error::codes::INTERNAL_ERROR.to_string(),
                    message: "An internal error occurred".to_string(),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                }
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}
