use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::plan::{ItemStatus, Modification, Operation, Plan, PlanIntegrityError, apply_modifications};

/// Stable machine codes for violated invariants.
pub mod issue_codes {
    pub const TARGET_NOT_FOUND: &str = "target_not_found";
    pub const STALE_SNAPSHOT: &str = "stale_snapshot";
    pub const COMPLETED_IMMUTABLE: &str = "completed_immutable";
    pub const PAST_ITEM_CONFIRMATION: &str = "past_item_confirmation";
    pub const DUPLICATE_DATE: &str = "duplicate_date";
    pub const HARD_ADJACENCY: &str = "hard_adjacency";
    pub const LONG_RUN_ADJACENCY: &str = "long_run_adjacency";
}

/// A single violated invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ValidationIssue {
    /// Stable machine code, e.g. "completed_immutable"
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl ValidationIssue {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            item_id: None,
            date: None,
        }
    }

    fn on_item(mut self, item_id: Uuid, date: NaiveDate) -> Self {
        self.item_id = Some(item_id);
        self.date = Some(date);
        self
    }

    fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

/// Outcome of checking a change-set against the canonical plan.
///
/// Errors block outright. Warnings block too, but clear when the caller
/// resubmits the same request with explicit confirmation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// Pure predicate over a proposed change-set and the canonical plan.
/// Invariants are evaluated against the schedule as it would exist after
/// applying every modification; nothing here mutates or performs I/O.
pub fn validate(modifications: &[Modification], plan: &Plan, today: NaiveDate) -> ValidationOutcome {
    let mut errors: Vec<ValidationIssue> = Vec::new();
    let mut warnings: Vec<ValidationIssue> = Vec::new();

    for modification in modifications {
        check_modification(modification, plan, today, &mut errors, &mut warnings);
    }

    // Post-modification invariants only make sense if the change-set applies
    // cleanly at all.
    if errors.is_empty() {
        match apply_modifications(plan, modifications) {
            Ok(next) => check_adjacency(&next, &mut errors),
            Err(PlanIntegrityError::DuplicateDate(date)) => {
                errors.push(
                    ValidationIssue::new(
                        issue_codes::DUPLICATE_DATE,
                        format!("two items would land on {date}"),
                    )
                    .with_date(date),
                );
            }
            Err(other) => {
                errors.push(ValidationIssue::new(
                    issue_codes::TARGET_NOT_FOUND,
                    other.to_string(),
                ));
            }
        }
    }

    ValidationOutcome {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn check_modification(
    modification: &Modification,
    plan: &Plan,
    today: NaiveDate,
    errors: &mut Vec<ValidationIssue>,
    warnings: &mut Vec<ValidationIssue>,
) {
    if modification.operation == Operation::Add {
        if let Some(existing) = plan.item_on(modification.target_date) {
            errors.push(
                ValidationIssue::new(
                    issue_codes::DUPLICATE_DATE,
                    format!("an item already exists on {}", modification.target_date),
                )
                .on_item(existing.id, existing.date),
            );
        }
        return;
    }

    let canonical = match plan.item_by_id(modification.target_item_id) {
        Some(item) if item.date == modification.target_date => item,
        _ => {
            errors.push(
                ValidationIssue::new(
                    issue_codes::TARGET_NOT_FOUND,
                    format!(
                        "no {} target on {}",
                        modification.operation.as_str(),
                        modification.target_date
                    ),
                )
                .on_item(modification.target_item_id, modification.target_date),
            );
            return;
        }
    };

    match &modification.before {
        Some(before) if before == canonical => {}
        _ => {
            errors.push(
                ValidationIssue::new(
                    issue_codes::STALE_SNAPSHOT,
                    "the plan changed since this proposal was drafted; re-draft against the current plan",
                )
                .on_item(canonical.id, canonical.date),
            );
            return;
        }
    }

    if canonical.status == ItemStatus::Completed {
        errors.push(
            ValidationIssue::new(
                issue_codes::COMPLETED_IMMUTABLE,
                format!(
                    "'{}' on {} is completed and cannot be changed",
                    canonical.title, canonical.date
                ),
            )
            .on_item(canonical.id, canonical.date),
        );
        return;
    }

    // Retroactively cancelling a missed session is harmless. Rewriting the
    // past is not, so it needs an explicit confirmation round-trip.
    if modification.target_date < today && modification.operation != Operation::Cancel {
        warnings.push(
            ValidationIssue::new(
                issue_codes::PAST_ITEM_CONFIRMATION,
                format!(
                    "'{}' on {} is in the past; confirm to {} it anyway",
                    canonical.title,
                    canonical.date,
                    modification.operation.as_str()
                ),
            )
            .on_item(canonical.id, canonical.date),
        );
    }
}

/// Two hard sessions, or two long runs, on exactly-adjacent calendar dates
/// is a training error. Dates are unique within a plan, so only neighbours
/// in sorted order can be one day apart.
fn check_adjacency(plan: &Plan, errors: &mut Vec<ValidationIssue>) {
    for pair in plan.items.windows(2) {
        let (first, second) = (&pair[0], &pair[1]);
        if (second.date - first.date).num_days() != 1 {
            continue;
        }
        if first.status == ItemStatus::Cancelled || second.status == ItemStatus::Cancelled {
            continue;
        }
        if first.is_hard() && second.is_hard() {
            errors.push(
                ValidationIssue::new(
                    issue_codes::HARD_ADJACENCY,
                    format!(
                        "hard sessions on consecutive days: {} and {}",
                        first.date, second.date
                    ),
                )
                .on_item(second.id, second.date),
            );
        }
        if first.is_long_run() && second.is_long_run() {
            errors.push(
                ValidationIssue::new(
                    issue_codes::LONG_RUN_ADJACENCY,
                    format!(
                        "long runs on consecutive days: {} and {}",
                        first.date, second.date
                    ),
                )
                .on_item(second.id, second.date),
            );
        }
    }
}
