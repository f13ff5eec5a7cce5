use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Tags that mark a session as a hard effort. Two of these landing on
/// adjacent calendar dates is a training error the validator rejects.
pub const HARD_WORKOUT_TAGS: &[&str] = &["interval", "tempo", "threshold", "race-pace"];

/// Tag for long endurance sessions; same adjacency rule as hard efforts.
pub const LONG_RUN_TAG: &str = "long-run";

/// Lifecycle state of a plan item. `Completed` is a historical record and
/// immutable through every modification path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl ItemStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One dated entry in a training plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlanItem {
    pub id: Uuid,
    /// Calendar date with no time-of-day. Unique within a plan.
    pub date: NaiveDate,
    pub title: String,
    pub status: ItemStatus,
    /// Workout-kind tags, e.g. "interval", "tempo", "long-run", "easy"
    pub tags: Vec<String>,
}

impl PlanItem {
    /// Weekday is derived from the date, never stored.
    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    pub fn is_hard(&self) -> bool {
        self.tags
            .iter()
            .any(|tag| HARD_WORKOUT_TAGS.contains(&tag.as_str()))
    }

    pub fn is_long_run(&self) -> bool {
        self.tags.iter().any(|tag| tag == LONG_RUN_TAG)
    }
}

/// A versioned, date-anchored training plan — the single source of truth.
/// Mutated only by a successful commit, which bumps `version` by exactly one.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Plan {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Monotonic counter guarding optimistic-concurrency writes.
    pub version: i64,
    /// IANA timezone name, e.g. "Europe/Berlin". Sole basis for "today".
    pub timezone: String,
    /// Sorted ascending by date; dates pairwise distinct.
    pub items: Vec<PlanItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanIntegrityError {
    #[error("two items share the date {0}")]
    DuplicateDate(NaiveDate),
    #[error("unknown item id {0}")]
    UnknownItem(Uuid),
    #[error("item {0} already exists")]
    DuplicateItem(Uuid),
}

impl Plan {
    pub fn item_on(&self, date: NaiveDate) -> Option<&PlanItem> {
        self.items.iter().find(|item| item.date == date)
    }

    pub fn item_by_id(&self, id: Uuid) -> Option<&PlanItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Restore the sorted-ascending order after edits.
    pub fn normalize(&mut self) {
        self.items.sort_by_key(|item| item.date);
    }

    /// Item dates must be pairwise distinct. Callers run this after any
    /// in-memory mutation; the database enforces the same via a unique
    /// constraint.
    pub fn check_distinct_dates(&self) -> Result<(), PlanIntegrityError> {
        let mut seen: std::collections::BTreeSet<NaiveDate> = std::collections::BTreeSet::new();
        for item in &self.items {
            if !seen.insert(item.date) {
                return Err(PlanIntegrityError::DuplicateDate(item.date));
            }
        }
        Ok(())
    }
}

/// The operation a modification performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Cancel,
    Reschedule,
    Modify,
    Swap,
    Add,
    Restore,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::Reschedule => "reschedule",
            Self::Modify => "modify",
            Self::Swap => "swap",
            Self::Add => "add",
            Self::Restore => "restore",
        }
    }
}

/// The delta a modification applies to its target. Only populated fields
/// change; everything else carries over from the `before` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ModificationDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
}

/// One proposed change against the canonical plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Modification {
    pub target_item_id: Uuid,
    pub target_date: NaiveDate,
    pub operation: Operation,
    /// Snapshot of the item as the proposal saw it. Must still match the
    /// canonical item at validation time; `None` only for `add`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<PlanItem>,
    pub after: ModificationDelta,
    pub reason: String,
}

impl Modification {
    /// Stable identity used for hashing and id-set comparison. Covers the
    /// target, the operation, and the full delta, so any tampering with a
    /// previewed change is detectable at commit time.
    pub fn identity(&self) -> String {
        let delta = serde_json::to_string(&self.after).unwrap_or_default();
        format!(
            "{}|{}|{}|{}",
            self.target_item_id,
            self.operation.as_str(),
            self.target_date,
            delta
        )
    }

    /// The item as it will exist after this modification is applied.
    /// `None` when the delta does not touch an existing item (pure `add`
    /// creates its item from the delta instead).
    pub fn applied_item(&self) -> Option<PlanItem> {
        let before = self.before.as_ref()?;
        let mut item = before.clone();
        if let Some(date) = self.after.date {
            item.date = date;
        }
        if let Some(title) = &self.after.title {
            item.title = title.clone();
        }
        if let Some(tags) = &self.after.tags {
            item.tags = tags.clone();
        }
        if let Some(status) = self.after.status {
            item.status = status;
        }
        Some(item)
    }

    /// Materialize the item created by an `add` modification.
    pub fn added_item(&self) -> PlanItem {
        PlanItem {
            id: self.target_item_id,
            date: self.after.date.unwrap_or(self.target_date),
            title: self.after.title.clone().unwrap_or_default(),
            status: self.after.status.unwrap_or(ItemStatus::Scheduled),
            tags: self.after.tags.clone().unwrap_or_default(),
        }
    }
}

/// Apply a change-set to a plan in memory, returning the post-modification
/// plan. Pure: the input plan is untouched, and a failed application has no
/// partial effect. The version counter is not bumped here; that belongs to
/// the conditional write at commit time.
pub fn apply_modifications(
    plan: &Plan,
    modifications: &[Modification],
) -> Result<Plan, PlanIntegrityError> {
    let mut next = plan.clone();
    for modification in modifications {
        match modification.operation {
            Operation::Add => {
                let item = modification.added_item();
                if next.item_by_id(item.id).is_some() {
                    return Err(PlanIntegrityError::DuplicateItem(item.id));
                }
                next.items.push(item);
            }
            _ => {
                let Some(updated) = modification.applied_item() else {
                    return Err(PlanIntegrityError::UnknownItem(modification.target_item_id));
                };
                let position = next
                    .items
                    .iter()
                    .position(|item| item.id == modification.target_item_id)
                    .ok_or(PlanIntegrityError::UnknownItem(modification.target_item_id))?;
                next.items[position] = PlanItem {
                    id: modification.target_item_id,
                    ..updated
                };
            }
        }
    }
    next.normalize();
    next.check_distinct_dates()?;
    Ok(next)
}
