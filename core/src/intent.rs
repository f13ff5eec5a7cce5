use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The scope of a cancel intent: one day, or an inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum CancelScope {
    Range { start: NaiveDate, end: NaiveDate },
    Single { date: NaiveDate },
}

/// What the drafter believes the user wants, discriminated by `operation`.
///
/// The drafter is an external model and its output is untrusted: anything
/// that does not parse into one of these variants is rejected outright with
/// a structured error. There is no best-effort coercion path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum DraftedIntent {
    /// Cancel everything still scheduled inside the scope.
    Cancel {
        scope: CancelScope,
        #[serde(default)]
        reason: Option<String>,
    },
    Reschedule {
        target_date: NaiveDate,
        new_date: NaiveDate,
        #[serde(default)]
        reason: Option<String>,
    },
    Modify {
        target_date: NaiveDate,
        #[serde(default)]
        new_title: Option<String>,
        #[serde(default)]
        new_tags: Option<Vec<String>>,
        #[serde(default)]
        reason: Option<String>,
    },
    Swap {
        first_date: NaiveDate,
        second_date: NaiveDate,
        #[serde(default)]
        reason: Option<String>,
    },
    Add {
        date: NaiveDate,
        title: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    Restore {
        target_date: NaiveDate,
        #[serde(default)]
        reason: Option<String>,
    },
    /// Question or commentary only; nothing to change.
    Info,
}

impl DraftedIntent {
    pub const fn operation_tag(&self) -> &'static str {
        match self {
            Self::Cancel { .. } => "cancel",
            Self::Reschedule { .. } => "reschedule",
            Self::Modify { .. } => "modify",
            Self::Swap { .. } => "swap",
            Self::Add { .. } => "add",
            Self::Restore { .. } => "restore",
            Self::Info => "info",
        }
    }
}

const KNOWN_OPERATIONS: &[&str] = &[
    "cancel",
    "reschedule",
    "modify",
    "swap",
    "add",
    "restore",
    "info",
];

/// Envelope returned by the intent drafter.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DrafterReply {
    #[serde(default)]
    pub requires_clarification: bool,
    #[serde(default)]
    pub clarification_question: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Raw intent payload; parsed separately so an unknown operation tag
    /// yields a precise rejection instead of an opaque serde error.
    #[serde(default)]
    pub intent: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentParseError {
    #[error("intent payload has no 'operation' field")]
    MissingOperation,
    #[error("unrecognized operation '{0}'")]
    UnknownOperation(String),
    #[error("malformed '{operation}' payload: {detail}")]
    MalformedPayload { operation: String, detail: String },
}

/// Structurally validate a drafted intent payload. The operation tag is
/// checked against the known set first so "unknown operation" and
/// "known operation, bad fields" stay distinguishable.
pub fn parse_intent(payload: &serde_json::Value) -> Result<DraftedIntent, IntentParseError> {
    let operation = payload
        .get("operation")
        .and_then(serde_json::Value::as_str)
        .ok_or(IntentParseError::MissingOperation)?;

    if !KNOWN_OPERATIONS.contains(&operation) {
        return Err(IntentParseError::UnknownOperation(operation.to_string()));
    }

    serde_json::from_value(payload.clone()).map_err(|err| IntentParseError::MalformedPayload {
        operation: operation.to_string(),
        detail: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CancelScope, DraftedIntent, IntentParseError, parse_intent};

    #[test]
    fn parses_single_day_cancel() {
        let intent = parse_intent(&json!({
            "operation": "cancel",
            "scope": { "date": "2026-03-01" },
            "reason": "feeling sick"
        }))
        .unwrap();
        let DraftedIntent::Cancel { scope, reason } = intent else {
            panic!("expected cancel");
        };
        assert_eq!(
            scope,
            CancelScope::Single {
                date: "2026-03-01".parse().unwrap()
            }
        );
        assert_eq!(reason.as_deref(), Some("feeling sick"));
    }

    #[test]
    fn parses_range_cancel() {
        let intent = parse_intent(&json!({
            "operation": "cancel",
            "scope": { "start": "2026-03-02", "end": "2026-03-08" }
        }))
        .unwrap();
        let DraftedIntent::Cancel { scope, .. } = intent else {
            panic!("expected cancel");
        };
        assert!(matches!(scope, CancelScope::Range { .. }));
    }

    #[test]
    fn rejects_unknown_operation_tag() {
        let err = parse_intent(&json!({ "operation": "obliterate", "date": "2026-03-01" }))
            .unwrap_err();
        assert_eq!(err, IntentParseError::UnknownOperation("obliterate".into()));
    }

    #[test]
    fn rejects_missing_operation() {
        let err = parse_intent(&json!({ "date": "2026-03-01" })).unwrap_err();
        assert_eq!(err, IntentParseError::MissingOperation);
    }

    #[test]
    fn rejects_known_operation_with_malformed_fields() {
        let err = parse_intent(&json!({
            "operation": "reschedule",
            "target_date": "2026-03-01"
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            IntentParseError::MalformedPayload { ref operation, .. } if operation == "reschedule"
        ));
    }

    #[test]
    fn rejects_garbage_dates() {
        let err = parse_intent(&json!({
            "operation": "reschedule",
            "target_date": "next tuesday",
            "new_date": "2026-03-05"
        }))
        .unwrap_err();
        assert!(matches!(err, IntentParseError::MalformedPayload { .. }));
    }

    #[test]
    fn parses_info_intent() {
        assert_eq!(
            parse_intent(&json!({ "operation": "info" })).unwrap(),
            DraftedIntent::Info
        );
    }
}
