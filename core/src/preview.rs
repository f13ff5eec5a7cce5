use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dates::DateRange;
use crate::intent::{CancelScope, DraftedIntent};
use crate::plan::{ItemStatus, Modification, ModificationDelta, Operation, Plan, PlanItem};

/// How long a preview stays committable. Expiry is reported distinctly from
/// hash or version mismatches.
pub const PREVIEW_TTL_MINUTES: i64 = 20;

/// Per-operation and per-status-transition counts shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PreviewSummary {
    pub total: usize,
    pub by_operation: BTreeMap<String, usize>,
    /// Keys like "scheduled->cancelled"; only actual status changes count.
    pub status_transitions: BTreeMap<String, usize>,
}

/// A committable, time-boxed change-set. Single-use: deleted on commit.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PreviewSet {
    pub id: Uuid,
    /// The draft proposal this preview came from (an intervention gate, or a
    /// fresh draft turn).
    pub proposal_id: Uuid,
    pub plan_id: Uuid,
    /// Plan version captured at creation; commit requires it unchanged.
    pub plan_version: i64,
    pub modifications: Vec<Modification>,
    pub affected_item_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_date_range: Option<DateRange>,
    pub summary: PreviewSummary,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
    pub requires_confirmation: bool,
    /// Digest over (sorted modification identities, plan id, plan version).
    pub hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PreviewSet {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Deterministic digest over the change-set identity. Recomputed at commit
/// time: any tampering with the modifications, or staleness of the plan
/// version, surfaces as a digest mismatch.
pub fn change_set_hash(modifications: &[Modification], plan_id: Uuid, plan_version: i64) -> String {
    let mut identities: Vec<String> = modifications.iter().map(Modification::identity).collect();
    identities.sort();

    let mut hasher = Sha256::new();
    for identity in &identities {
        hasher.update(identity.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(plan_id.as_bytes());
    hasher.update(plan_version.to_be_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no item on {0}")]
    NoItemOnDate(NaiveDate),
    #[error("nothing scheduled between {start} and {end}")]
    EmptyCancelScope { start: NaiveDate, end: NaiveDate },
    #[error("no cancelled item on {0} to restore")]
    NothingToRestore(NaiveDate),
    #[error("an item already exists on {0}")]
    DateOccupied(NaiveDate),
    #[error("the request changes nothing")]
    EmptyDelta,
}

fn cancel_item(item: &PlanItem, reason: &str) -> Modification {
    Modification {
        target_item_id: item.id,
        target_date: item.date,
        operation: Operation::Cancel,
        before: Some(item.clone()),
        after: ModificationDelta {
            status: Some(ItemStatus::Cancelled),
            ..ModificationDelta::default()
        },
        reason: reason.to_string(),
    }
}

fn target_item(plan: &Plan, date: NaiveDate) -> Result<&PlanItem, ResolveError> {
    plan.item_on(date).ok_or(ResolveError::NoItemOnDate(date))
}

/// Turn a structurally-valid drafted intent into concrete modifications
/// against the canonical plan. Content is preserved unless an explicit
/// change was requested; scope cancels select only `scheduled` items.
pub fn resolve_modifications(
    intent: &DraftedIntent,
    plan: &Plan,
) -> Result<Vec<Modification>, ResolveError> {
    match intent {
        DraftedIntent::Cancel { scope, reason } => {
            let (start, end) = match scope {
                CancelScope::Single { date } => (*date, *date),
                CancelScope::Range { start, end } => (*start, *end),
            };
            let reason = reason.as_deref().unwrap_or("cancelled at user request");
            let cancels: Vec<Modification> = plan
                .items
                .iter()
                .filter(|item| {
                    item.date >= start && item.date <= end && item.status == ItemStatus::Scheduled
                })
                .map(|item| cancel_item(item, reason))
                .collect();
            if cancels.is_empty() {
                return Err(ResolveError::EmptyCancelScope { start, end });
            }
            Ok(cancels)
        }
        DraftedIntent::Reschedule {
            target_date,
            new_date,
            reason,
        } => {
            let item = target_item(plan, *target_date)?;
            if plan.item_on(*new_date).is_some() {
                return Err(ResolveError::DateOccupied(*new_date));
            }
            Ok(vec![Modification {
                target_item_id: item.id,
                target_date: item.date,
                operation: Operation::Reschedule,
                before: Some(item.clone()),
                after: ModificationDelta {
                    date: Some(*new_date),
                    ..ModificationDelta::default()
                },
                reason: reason.clone().unwrap_or_else(|| "rescheduled".to_string()),
            }])
        }
        DraftedIntent::Modify {
            target_date,
            new_title,
            new_tags,
            reason,
        } => {
            if new_title.is_none() && new_tags.is_none() {
                return Err(ResolveError::EmptyDelta);
            }
            let item = target_item(plan, *target_date)?;
            Ok(vec![Modification {
                target_item_id: item.id,
                target_date: item.date,
                operation: Operation::Modify,
                before: Some(item.clone()),
                after: ModificationDelta {
                    title: new_title.clone(),
                    tags: new_tags.clone(),
                    ..ModificationDelta::default()
                },
                reason: reason.clone().unwrap_or_else(|| "modified".to_string()),
            }])
        }
        DraftedIntent::Swap {
            first_date,
            second_date,
            reason,
        } => {
            let first = target_item(plan, *first_date)?;
            let second = target_item(plan, *second_date)?;
            let reason = reason.as_deref().unwrap_or("swapped");
            let swap = |item: &PlanItem, to: NaiveDate| Modification {
                target_item_id: item.id,
                target_date: item.date,
                operation: Operation::Swap,
                before: Some(item.clone()),
                after: ModificationDelta {
                    date: Some(to),
                    ..ModificationDelta::default()
                },
                reason: reason.to_string(),
            };
            Ok(vec![swap(first, *second_date), swap(second, *first_date)])
        }
        DraftedIntent::Add {
            date,
            title,
            tags,
            reason,
        } => {
            if plan.item_on(*date).is_some() {
                return Err(ResolveError::DateOccupied(*date));
            }
            Ok(vec![Modification {
                target_item_id: Uuid::now_v7(),
                target_date: *date,
                operation: Operation::Add,
                before: None,
                after: ModificationDelta {
                    date: Some(*date),
                    title: Some(title.clone()),
                    tags: Some(tags.clone()),
                    status: Some(ItemStatus::Scheduled),
                },
                reason: reason.clone().unwrap_or_else(|| "added".to_string()),
            }])
        }
        DraftedIntent::Restore {
            target_date,
            reason,
        } => {
            let item = target_item(plan, *target_date)?;
            if item.status != ItemStatus::Cancelled {
                return Err(ResolveError::NothingToRestore(*target_date));
            }
            Ok(vec![Modification {
                target_item_id: item.id,
                target_date: item.date,
                operation: Operation::Restore,
                before: Some(item.clone()),
                after: ModificationDelta {
                    status: Some(ItemStatus::Scheduled),
                    ..ModificationDelta::default()
                },
                reason: reason.clone().unwrap_or_else(|| "restored".to_string()),
            }])
        }
        DraftedIntent::Info => Ok(Vec::new()),
    }
}

/// Assemble the immutable, hashed, time-boxed change-set from a validated,
/// intervention-cleared draft.
pub fn build_preview(
    plan: &Plan,
    proposal_id: Uuid,
    modifications: Vec<Modification>,
    warnings: Vec<String>,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> PreviewSet {
    let mut by_operation: BTreeMap<String, usize> = BTreeMap::new();
    let mut status_transitions: BTreeMap<String, usize> = BTreeMap::new();
    let mut affected_item_ids: Vec<Uuid> = Vec::new();
    let mut dates: Vec<NaiveDate> = Vec::new();

    for modification in &modifications {
        *by_operation
            .entry(modification.operation.as_str().to_string())
            .or_insert(0) += 1;
        affected_item_ids.push(modification.target_item_id);
        dates.push(modification.target_date);
        if let Some(new_date) = modification.after.date {
            dates.push(new_date);
        }

        let from = modification
            .before
            .as_ref()
            .map_or("none", |before| before.status.as_str());
        if let Some(to) = modification.after.status {
            if Some(to) != modification.before.as_ref().map(|before| before.status) {
                *status_transitions
                    .entry(format!("{from}->{}", to.as_str()))
                    .or_insert(0) += 1;
            }
        }
    }

    let affected_date_range = match (dates.iter().min(), dates.iter().max()) {
        (Some(start), Some(end)) => Some(DateRange {
            start: *start,
            end: *end,
        }),
        _ => None,
    };

    let has_future_cancel = modifications.iter().any(|modification| {
        modification.operation == Operation::Cancel && modification.target_date >= today
    });
    let requires_confirmation = modifications.len() >= 2 || has_future_cancel;

    let hash = change_set_hash(&modifications, plan.id, plan.version);
    PreviewSet {
        id: Uuid::now_v7(),
        proposal_id,
        plan_id: plan.id,
        plan_version: plan.version,
        summary: PreviewSummary {
            total: modifications.len(),
            by_operation,
            status_transitions,
        },
        modifications,
        affected_item_ids,
        affected_date_range,
        warnings,
        requires_confirmation,
        hash,
        created_at: now,
        expires_at: now + Duration::minutes(PREVIEW_TTL_MINUTES),
    }
}
