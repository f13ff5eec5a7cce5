use serde::Serialize;
use utoipa::ToSchema;

/// Structured error response — built for the agent on the other end of the
/// conversation. Every error carries enough for the caller to decide whether
/// to silently re-draft, re-ask the user, or give up.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "version_mismatch")
    pub error: String,
    /// Human/agent-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const CLARIFICATION_REQUIRED: &str = "clarification_required";
    pub const CONFIRMATION_REQUIRED: &str = "confirmation_required";
    pub const INTERVENTION_REQUIRED: &str = "intervention_required";
    pub const PREVIEW_NOT_FOUND: &str = "preview_not_found";
    pub const PREVIEW_EXPIRED: &str = "preview_expired";
    pub const WORKOUT_MISMATCH: &str = "workout_mismatch";
    pub const VERSION_MISMATCH: &str = "version_mismatch";
    pub const DATABASE_CONFLICT: &str = "database_conflict";
    pub const DRAFTER_TIMEOUT: &str = "drafter_timeout";
    pub const DRAFTER_UNAVAILABLE: &str = "drafter_unavailable";
    pub const DRAFTER_INVALID_RESPONSE: &str = "drafter_invalid_response";
    pub const NOT_FOUND: &str = "not_found";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const INTERNAL_ERROR: &str = "internal_error";
}
