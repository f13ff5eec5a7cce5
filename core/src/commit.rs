use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::codes;
use crate::preview::{PreviewSet, change_set_hash};

/// Why a commit was refused. Each code is distinct so the caller knows
/// whether to silently re-preview (version drift) or tell the user
/// (mismatch, expiry). Conflicts are never auto-resolved and never retried
/// by the engine; retry is exclusively the caller's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommitRejection {
    #[error("no preview with this id exists for the plan")]
    PreviewNotFound,
    #[error("the preview expired; draft the change again")]
    PreviewExpired,
    #[error("confirmed items do not match the previewed change-set")]
    WorkoutMismatch,
    #[error("the plan changed since the preview was created; refresh and re-draft")]
    VersionMismatch,
    #[error("a concurrent write won the version race; refresh and retry")]
    DatabaseConflict,
}

impl CommitRejection {
    pub const fn code(self) -> &'static str {
        match self {
            Self::PreviewNotFound => codes::PREVIEW_NOT_FOUND,
            Self::PreviewExpired => codes::PREVIEW_EXPIRED,
            Self::WorkoutMismatch => codes::WORKOUT_MISMATCH,
            Self::VersionMismatch => codes::VERSION_MISMATCH,
            Self::DatabaseConflict => codes::DATABASE_CONFLICT,
        }
    }
}

/// Everything the caller must present to commit a preview.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CommitRequest {
    pub preview_id: Uuid,
    /// Exact set of item ids the user confirmed, order-irrelevant.
    pub confirmed_item_ids: Vec<Uuid>,
    /// The plan version the caller believes is current.
    pub plan_version: i64,
}

/// Ordered pre-apply checks, short-circuiting on the first failure. The
/// conditional write that follows can still lose the race and surface
/// [`CommitRejection::DatabaseConflict`]; these checks make every other
/// failure mode precise before a transaction is even opened.
pub fn check_commit(
    preview: &PreviewSet,
    plan_id: Uuid,
    request: &CommitRequest,
    current_version: i64,
    now: DateTime<Utc>,
) -> Result<(), CommitRejection> {
    if preview.plan_id != plan_id || preview.id != request.preview_id {
        return Err(CommitRejection::PreviewNotFound);
    }

    if preview.is_expired(now) {
        return Err(CommitRejection::PreviewExpired);
    }

    // Symmetric equality: a missing confirmation and an extra one are both
    // mismatches.
    let confirmed: BTreeSet<Uuid> = request.confirmed_item_ids.iter().copied().collect();
    let previewed: BTreeSet<Uuid> = preview
        .modifications
        .iter()
        .map(|modification| modification.target_item_id)
        .collect();
    if confirmed != previewed {
        return Err(CommitRejection::WorkoutMismatch);
    }

    if preview.plan_version != current_version {
        return Err(CommitRejection::VersionMismatch);
    }
    if request.plan_version != current_version {
        return Err(CommitRejection::VersionMismatch);
    }

    // The digest covers modification identities, plan id, and version; a
    // divergence here means the stored preview no longer describes the
    // change-set it was created for.
    if change_set_hash(&preview.modifications, preview.plan_id, preview.plan_version)
        != preview.hash
    {
        return Err(CommitRejection::VersionMismatch);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use uuid::Uuid;

    use super::{CommitRejection, CommitRequest, check_commit};
    use crate::plan::{
        ItemStatus, Modification, ModificationDelta, Operation, Plan, PlanItem,
        apply_modifications,
    };
    use crate::preview::{PreviewSet, build_preview};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn make_item(date_str: &str) -> PlanItem {
        PlanItem {
            id: Uuid::now_v7(),
            date: date(date_str),
            title: "Easy 10k".to_string(),
            status: ItemStatus::Scheduled,
            tags: vec!["easy".to_string()],
        }
    }

    fn make_plan(version: i64, items: Vec<PlanItem>) -> Plan {
        let mut plan = Plan {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            version,
            timezone: "Europe/Berlin".to_string(),
            items,
        };
        plan.normalize();
        plan
    }

    fn cancel_mods(plan: &Plan) -> Vec<Modification> {
        plan.items
            .iter()
            .map(|item| Modification {
                target_item_id: item.id,
                target_date: item.date,
                operation: Operation::Cancel,
                before: Some(item.clone()),
                after: ModificationDelta {
                    status: Some(ItemStatus::Cancelled),
                    ..ModificationDelta::default()
                },
                reason: String::new(),
            })
            .collect()
    }

    fn preview_for(plan: &Plan) -> PreviewSet {
        build_preview(
            plan,
            Uuid::now_v7(),
            cancel_mods(plan),
            Vec::new(),
            date("2026-02-11"),
            Utc::now(),
        )
    }

    fn request_for(preview: &PreviewSet) -> CommitRequest {
        CommitRequest {
            preview_id: preview.id,
            confirmed_item_ids: preview
                .modifications
                .iter()
                .map(|m| m.target_item_id)
                .collect(),
            plan_version: preview.plan_version,
        }
    }

    #[test]
    fn clean_commit_passes_every_check() {
        let plan = make_plan(3, vec![make_item("2026-03-01"), make_item("2026-03-02")]);
        let preview = preview_for(&plan);
        let request = request_for(&preview);
        assert_eq!(
            check_commit(&preview, plan.id, &request, plan.version, Utc::now()),
            Ok(())
        );
    }

    #[test]
    fn version_drift_rejects_and_leaves_plan_untouched() {
        // Preview captured at version 3; a concurrent edit bumped it to 4.
        let plan = make_plan(3, vec![make_item("2026-03-01"), make_item("2026-03-02")]);
        let preview = preview_for(&plan);
        let request = request_for(&preview);

        let before = plan.clone();
        assert_eq!(
            check_commit(&preview, plan.id, &request, 4, Utc::now()),
            Err(CommitRejection::VersionMismatch)
        );
        assert_eq!(plan.items, before.items);
        assert_eq!(plan.version, 3);
    }

    #[test]
    fn caller_version_mismatch_is_rejected_even_when_preview_is_current() {
        let plan = make_plan(4, vec![make_item("2026-03-01")]);
        let preview = preview_for(&plan);
        let mut request = request_for(&preview);
        request.plan_version = 3;
        assert_eq!(
            check_commit(&preview, plan.id, &request, 4, Utc::now()),
            Err(CommitRejection::VersionMismatch)
        );
    }

    #[test]
    fn id_set_mismatch_is_rejected_in_both_directions() {
        let plan = make_plan(3, vec![make_item("2026-03-01"), make_item("2026-03-02")]);
        let preview = preview_for(&plan);

        let mut missing = request_for(&preview);
        missing.confirmed_item_ids.pop();
        assert_eq!(
            check_commit(&preview, plan.id, &missing, plan.version, Utc::now()),
            Err(CommitRejection::WorkoutMismatch)
        );

        let mut extra = request_for(&preview);
        extra.confirmed_item_ids.push(Uuid::now_v7());
        assert_eq!(
            check_commit(&preview, plan.id, &extra, plan.version, Utc::now()),
            Err(CommitRejection::WorkoutMismatch)
        );
    }

    #[test]
    fn expiry_wins_over_later_checks() {
        let plan = make_plan(3, vec![make_item("2026-03-01")]);
        let preview = preview_for(&plan);
        let mut request = request_for(&preview);
        request.confirmed_item_ids.clear();

        let after_expiry = preview.expires_at + Duration::seconds(1);
        assert_eq!(
            check_commit(&preview, plan.id, &request, 99, after_expiry),
            Err(CommitRejection::PreviewExpired)
        );
    }

    #[test]
    fn wrong_plan_id_reads_as_preview_not_found() {
        let plan = make_plan(3, vec![make_item("2026-03-01")]);
        let preview = preview_for(&plan);
        let request = request_for(&preview);
        assert_eq!(
            check_commit(&preview, Uuid::now_v7(), &request, plan.version, Utc::now()),
            Err(CommitRejection::PreviewNotFound)
        );
    }

    #[test]
    fn tampered_modifications_fail_the_digest_check() {
        let plan = make_plan(3, vec![make_item("2026-03-01")]);
        let mut preview = preview_for(&plan);
        preview.modifications[0].after.date = Some(date("2026-03-09"));
        let request = request_for(&preview);
        assert_eq!(
            check_commit(&preview, plan.id, &request, plan.version, Utc::now()),
            Err(CommitRejection::VersionMismatch)
        );
    }

    #[test]
    fn applying_a_previewed_cancel_set_is_atomic_in_memory() {
        let plan = make_plan(3, vec![make_item("2026-03-01"), make_item("2026-03-02")]);
        let preview = preview_for(&plan);

        let next = apply_modifications(&plan, &preview.modifications).unwrap();
        assert!(
            next.items
                .iter()
                .all(|item| item.status == ItemStatus::Cancelled)
        );
        // The canonical plan is untouched until the conditional write lands.
        assert!(
            plan.items
                .iter()
                .all(|item| item.status == ItemStatus::Scheduled)
        );
    }
}
