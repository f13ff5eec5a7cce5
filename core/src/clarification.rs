use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dates::{DateOption, PhraseResolution, resolve_relative_phrase};
use crate::phrases::ExtractedPhrase;

pub const CLARIFICATION_TTL_MINUTES: i64 = 20;

/// Dates already pinned down earlier in the exchange, keyed by normalized
/// phrase. Keying on the canonical form, not raw text or object identity,
/// is what makes resubmission idempotent: a phrase answered once in an
/// exchange is never asked again.
pub type ResolvedDates = BTreeMap<String, NaiveDate>;

/// A pending disambiguation turn, persisted with a TTL. An abandoned
/// clarification needs no cleanup path; it simply expires.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClarificationRequest {
    pub id: Uuid,
    pub plan_id: Uuid,
    /// The key future turns carry in their resolved-date map.
    pub normalized_phrase: String,
    pub question: String,
    pub options: Vec<DateOption>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ClarificationRequest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The first ambiguous phrase the exchange has not already resolved, if any.
/// The pipeline halts for clarification exactly when this is `Some`.
pub fn first_unresolved<'a>(
    phrases: &'a [ExtractedPhrase],
    resolved: &ResolvedDates,
) -> Option<&'a ExtractedPhrase> {
    phrases
        .iter()
        .find(|phrase| phrase.ambiguous && !resolved.contains_key(&phrase.normalized))
}

/// Build the disambiguation turn for an ambiguous phrase. Returns `None` if
/// the phrase turns out to resolve cleanly after all.
pub fn clarification_for(
    plan_id: Uuid,
    phrase: &ExtractedPhrase,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Option<ClarificationRequest> {
    match resolve_relative_phrase(&phrase.normalized, today) {
        Ok(PhraseResolution::Ambiguous { options, question }) => Some(ClarificationRequest {
            id: Uuid::now_v7(),
            plan_id,
            normalized_phrase: phrase.normalized.clone(),
            question,
            options,
            created_at: now,
            expires_at: now + Duration::minutes(CLARIFICATION_TTL_MINUTES),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use super::{ResolvedDates, clarification_for, first_unresolved};
    use crate::phrases::extract_date_phrases;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn halts_on_the_first_unresolved_ambiguity() {
        let phrases = extract_date_phrases("move Tuesday's run to Friday");
        let resolved = ResolvedDates::new();
        let unresolved = first_unresolved(&phrases, &resolved).unwrap();
        assert_eq!(unresolved.normalized, "tuesday");
    }

    #[test]
    fn resolved_phrases_are_never_asked_again() {
        let phrases = extract_date_phrases("move Tuesday's run to Friday");
        let mut resolved = ResolvedDates::new();
        resolved.insert("tuesday".to_string(), date("2026-02-10"));

        let unresolved = first_unresolved(&phrases, &resolved).unwrap();
        assert_eq!(unresolved.normalized, "friday");

        resolved.insert("friday".to_string(), date("2026-02-13"));
        assert!(first_unresolved(&phrases, &resolved).is_none());

        // Resubmitting the identical message stays resolved: the key is the
        // normalized phrase, not the extraction instance.
        let resubmitted = extract_date_phrases("move Tuesday's run to Friday");
        assert!(first_unresolved(&resubmitted, &resolved).is_none());
    }

    #[test]
    fn clarification_carries_exactly_two_options() {
        let phrases = extract_date_phrases("cancel Tuesday");
        let clarification = clarification_for(
            Uuid::now_v7(),
            &phrases[0],
            date("2026-02-11"),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(clarification.options.len(), 2);
        assert_eq!(clarification.options[0].date, date("2026-02-10"));
        assert_eq!(clarification.options[1].date, date("2026-02-17"));
        assert!(!clarification.is_expired(clarification.created_at));
        assert!(clarification.is_expired(clarification.expires_at));
    }

    #[test]
    fn qualified_phrases_never_produce_clarifications() {
        let phrases = extract_date_phrases("cancel next tuesday");
        let resolved = ResolvedDates::new();
        assert!(first_unresolved(&phrases, &resolved).is_none());
    }
}
