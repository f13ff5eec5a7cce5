use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dates::add_days;
use crate::plan::{Modification, ModificationDelta, Operation, Plan};

/// Simultaneous future cancellations that trigger the multi-cancel gate.
pub const MULTI_CANCEL_MIN: usize = 2;
pub const MULTI_CANCEL_MAX: usize = 3;

/// Minimum inclusive day span of a cancellation set that triggers the
/// long-range gate (when the set is outside the multi-cancel band).
pub const LONG_RANGE_SPAN_DAYS: i64 = 7;

/// How long a pending gate waits for the user's reply before expiring.
pub const INTERVENTION_TTL_MINUTES: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InterventionReason {
    MultipleCancellations,
    LongRange,
}

impl InterventionReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MultipleCancellations => "multiple_cancellations",
            Self::LongRange => "long_range",
        }
    }
}

/// How an alternative is addressed in the conversation. The escape hatch
/// (`Proceed`) is always presented last, as option "c".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlternativeKey {
    A,
    B,
    Proceed,
}

impl AlternativeKey {
    pub const fn option_letter(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
            Self::Proceed => "c",
        }
    }
}

/// A labelled alternative offered instead of the destructive operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InterventionAlternative {
    pub key: AlternativeKey,
    pub label: String,
    pub description: String,
}

/// Where the gate stands for the current turn.
#[derive(Debug, Clone, PartialEq)]
pub enum InterventionState {
    /// Terminal: proceed to preview.
    NoIntervention,
    /// Terminal for this turn; the conversation continues with the
    /// questions and alternatives below.
    Pending {
        reason: InterventionReason,
        questions: Vec<String>,
        alternatives: Vec<InterventionAlternative>,
    },
}

/// Persisted gate state bridging conversational turns. Nothing survives in
/// process memory between turns; a pending gate lives here, TTL-bound, until
/// the user replies or abandons the exchange.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InterventionProposal {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub reason: InterventionReason,
    pub questions: Vec<String>,
    pub alternatives: Vec<InterventionAlternative>,
    /// The gated cancel set, carried verbatim for the resolution turn.
    pub modifications: Vec<Modification>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Classified user reply to a pending intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyChoice {
    A,
    B,
    Proceed,
    /// No confident read on the reply. The gate stays pending; guessing at
    /// intent is exactly what this engine exists to avoid.
    Unknown,
}

impl ReplyChoice {
    pub fn into_key(self) -> Option<AlternativeKey> {
        match self {
            Self::A => Some(AlternativeKey::A),
            Self::B => Some(AlternativeKey::B),
            Self::Proceed => Some(AlternativeKey::Proceed),
            Self::Unknown => None,
        }
    }
}

/// Evaluate the gate over a change-set. Only cancel operations on today-or-
/// future dates count: retroactive no-shows are not destructive.
pub fn evaluate(modifications: &[Modification], today: NaiveDate) -> InterventionState {
    let future_cancels: Vec<&Modification> = modifications
        .iter()
        .filter(|m| m.operation == Operation::Cancel && m.target_date >= today)
        .collect();

    match future_cancels.len() {
        0 | 1 => InterventionState::NoIntervention,
        n if (MULTI_CANCEL_MIN..=MULTI_CANCEL_MAX).contains(&n) => pending(
            InterventionReason::MultipleCancellations,
            vec![format!(
                "You're cancelling {n} upcoming sessions. Want to keep some of the training stimulus instead?"
            )],
        ),
        _ => {
            let span = cancel_span_days(&future_cancels);
            if span >= LONG_RANGE_SPAN_DAYS {
                pending(
                    InterventionReason::LongRange,
                    vec![format!(
                        "That clears {span} days of training. Should we plan a lighter block instead of a gap?"
                    )],
                )
            } else {
                InterventionState::NoIntervention
            }
        }
    }
}

fn cancel_span_days(cancels: &[&Modification]) -> i64 {
    let min = cancels.iter().map(|m| m.target_date).min();
    let max = cancels.iter().map(|m| m.target_date).max();
    match (min, max) {
        (Some(min), Some(max)) => (max - min).num_days() + 1,
        _ => 0,
    }
}

fn pending(reason: InterventionReason, questions: Vec<String>) -> InterventionState {
    InterventionState::Pending {
        reason,
        alternatives: alternatives_for(reason),
        questions,
    }
}

pub fn alternatives_for(reason: InterventionReason) -> Vec<InterventionAlternative> {
    let (a, b) = match reason {
        InterventionReason::MultipleCancellations => (
            (
                "Convert to easy sessions",
                "Keep the days but turn each session into an easy effort.",
            ),
            (
                "Reschedule within the week",
                "Move each session to a free day later in its week.",
            ),
        ),
        InterventionReason::LongRange => (
            (
                "Recovery week",
                "Replace the block with short recovery sessions.",
            ),
            (
                "Reduced intensity",
                "Keep the sessions but drop them to easy effort.",
            ),
        ),
    };
    vec![
        InterventionAlternative {
            key: AlternativeKey::A,
            label: a.0.to_string(),
            description: a.1.to_string(),
        },
        InterventionAlternative {
            key: AlternativeKey::B,
            label: b.0.to_string(),
            description: b.1.to_string(),
        },
        InterventionAlternative {
            key: AlternativeKey::Proceed,
            label: "Cancel anyway".to_string(),
            description: "Apply the cancellations exactly as requested.".to_string(),
        },
    ]
}

const PROCEED_PHRASES: &[&str] = &["proceed", "go ahead", "anyway", "as requested", "just cancel"];

/// Minimum Jaro-Winkler similarity for a fuzzy label match.
const FUZZY_MATCH_THRESHOLD: f64 = 0.84;

/// Classify a free-text reply against the offered alternatives.
///
/// Resolution order: explicit option letter, proceed keywords, label keyword
/// overlap, fuzzy label similarity. Anything else is `Unknown` and leaves
/// the gate pending.
pub fn classify_reply(reply: &str, alternatives: &[InterventionAlternative]) -> ReplyChoice {
    let normalized: String = reply
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    if let Some(choice) = explicit_letter(&tokens) {
        return choice;
    }

    if PROCEED_PHRASES
        .iter()
        .any(|phrase| normalized.contains(phrase))
    {
        return ReplyChoice::Proceed;
    }

    for alternative in alternatives {
        let matches_keyword = alternative
            .label
            .to_lowercase()
            .split_whitespace()
            .chain(alternative.description.to_lowercase().split_whitespace())
            .filter(|word| word.len() > 3)
            .any(|word| {
                tokens
                    .iter()
                    .any(|token| token.trim_matches(|c: char| !c.is_alphanumeric()) == word)
            });
        if matches_keyword {
            return key_to_choice(alternative.key);
        }
    }

    let mut best: Option<(f64, AlternativeKey)> = None;
    for alternative in alternatives {
        let score = strsim::jaro_winkler(normalized.trim(), &alternative.label.to_lowercase());
        if score >= FUZZY_MATCH_THRESHOLD && best.is_none_or(|(prev, _)| score > prev) {
            best = Some((score, alternative.key));
        }
    }
    if let Some((_, key)) = best {
        return key_to_choice(key);
    }

    ReplyChoice::Unknown
}

fn key_to_choice(key: AlternativeKey) -> ReplyChoice {
    match key {
        AlternativeKey::A => ReplyChoice::A,
        AlternativeKey::B => ReplyChoice::B,
        AlternativeKey::Proceed => ReplyChoice::Proceed,
    }
}

fn explicit_letter(tokens: &[&str]) -> Option<ReplyChoice> {
    let letter = match tokens {
        [single] => *single,
        _ => {
            let position = tokens.iter().position(|t| *t == "option")?;
            *tokens.get(position + 1)?
        }
    };
    match letter {
        "a" => Some(ReplyChoice::A),
        "b" => Some(ReplyChoice::B),
        "c" => Some(ReplyChoice::Proceed),
        _ => None,
    }
}

/// Rewrite the gated cancel set according to the chosen alternative.
/// `Proceed` carries the original operations through unchanged; A and B
/// translate each future cancel into the alternative's operation. The
/// result re-enters validation like any other draft.
pub fn translate_choice(
    key: AlternativeKey,
    reason: InterventionReason,
    modifications: &[Modification],
    plan: &Plan,
) -> Vec<Modification> {
    if key == AlternativeKey::Proceed {
        return modifications.to_vec();
    }

    let mut claimed_dates: Vec<NaiveDate> = plan.items.iter().map(|item| item.date).collect();
    modifications
        .iter()
        .map(|modification| {
            if modification.operation != Operation::Cancel {
                return modification.clone();
            }
            match (reason, key) {
                (InterventionReason::MultipleCancellations, AlternativeKey::A) => convert(
                    modification,
                    Some("Easy run"),
                    vec!["easy"],
                    "converted to an easy session instead of cancelling",
                ),
                (InterventionReason::MultipleCancellations, AlternativeKey::B) => {
                    reschedule_within_week(modification, &mut claimed_dates)
                }
                (InterventionReason::LongRange, AlternativeKey::A) => convert(
                    modification,
                    Some("Recovery run"),
                    vec!["recovery", "easy"],
                    "replaced with a recovery session",
                ),
                (InterventionReason::LongRange, AlternativeKey::B) => convert(
                    modification,
                    None,
                    vec!["easy"],
                    "reduced to easy intensity",
                ),
                (_, AlternativeKey::Proceed) => modification.clone(),
            }
        })
        .collect()
}

fn convert(
    modification: &Modification,
    title: Option<&str>,
    tags: Vec<&str>,
    reason: &str,
) -> Modification {
    Modification {
        operation: Operation::Modify,
        after: ModificationDelta {
            title: title.map(str::to_string),
            tags: Some(tags.into_iter().map(str::to_string).collect()),
            ..ModificationDelta::default()
        },
        reason: reason.to_string(),
        ..modification.clone()
    }
}

/// Move a cancelled session to the first free day later in its own
/// Monday–Sunday week. With no free day left, the original cancel stands.
fn reschedule_within_week(
    modification: &Modification,
    claimed_dates: &mut Vec<NaiveDate>,
) -> Modification {
    let date = modification.target_date;
    let week_end = add_days(
        date,
        6 - i64::from(date.weekday().num_days_from_monday()),
    );

    let mut candidate = add_days(date, 1);
    while candidate <= week_end {
        if !claimed_dates.contains(&candidate) {
            claimed_dates.push(candidate);
            return Modification {
                operation: Operation::Reschedule,
                after: ModificationDelta {
                    date: Some(candidate),
                    ..ModificationDelta::default()
                },
                reason: "rescheduled within the week instead of cancelling".to_string(),
                ..modification.clone()
            };
        }
        candidate = add_days(candidate, 1);
    }
    modification.clone()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::{
        AlternativeKey, InterventionReason, InterventionState, ReplyChoice, alternatives_for,
        classify_reply, evaluate, translate_choice,
    };
    use crate::plan::{ItemStatus, Modification, ModificationDelta, Operation, Plan, PlanItem};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn today() -> NaiveDate {
        date("2026-02-11")
    }

    fn make_item(date_str: &str) -> PlanItem {
        PlanItem {
            id: Uuid::now_v7(),
            date: date(date_str),
            title: "Tempo 6k".to_string(),
            status: ItemStatus::Scheduled,
            tags: vec!["tempo".to_string()],
        }
    }

    fn cancel_on(date_str: &str) -> Modification {
        let item = make_item(date_str);
        Modification {
            target_item_id: item.id,
            target_date: item.date,
            operation: Operation::Cancel,
            before: Some(item),
            after: ModificationDelta {
                status: Some(ItemStatus::Cancelled),
                ..ModificationDelta::default()
            },
            reason: String::new(),
        }
    }

    fn make_plan(items: Vec<PlanItem>) -> Plan {
        let mut plan = Plan {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            version: 1,
            timezone: "Europe/Berlin".to_string(),
            items,
        };
        plan.normalize();
        plan
    }

    #[test]
    fn single_future_cancel_never_intervenes() {
        let state = evaluate(&[cancel_on("2026-02-20")], today());
        assert_eq!(state, InterventionState::NoIntervention);
    }

    #[test]
    fn two_and_three_cancels_trigger_multiple_cancellations() {
        for dates in [
            vec!["2026-02-16", "2026-02-18"],
            vec!["2026-02-16", "2026-02-18", "2026-02-20"],
        ] {
            let mods: Vec<Modification> = dates.iter().map(|d| cancel_on(d)).collect();
            let InterventionState::Pending {
                reason,
                alternatives,
                ..
            } = evaluate(&mods, today())
            else {
                panic!("expected a pending gate for {dates:?}");
            };
            assert_eq!(reason, InterventionReason::MultipleCancellations);
            assert_eq!(alternatives.len(), 3);
        }
    }

    #[test]
    fn wide_cancel_set_triggers_long_range() {
        let mods: Vec<Modification> = [
            "2026-02-16",
            "2026-02-18",
            "2026-02-20",
            "2026-02-22",
            "2026-02-24",
        ]
        .iter()
        .map(|d| cancel_on(d))
        .collect();

        let InterventionState::Pending { reason, .. } = evaluate(&mods, today()) else {
            panic!("expected a pending gate");
        };
        assert_eq!(reason, InterventionReason::LongRange);
    }

    #[test]
    fn narrow_set_of_four_cancels_passes() {
        let mods: Vec<Modification> = ["2026-02-16", "2026-02-17", "2026-02-18", "2026-02-19"]
            .iter()
            .map(|d| cancel_on(d))
            .collect();
        assert_eq!(evaluate(&mods, today()), InterventionState::NoIntervention);
    }

    #[test]
    fn past_cancels_do_not_count() {
        let mods = [cancel_on("2026-02-01"), cancel_on("2026-02-20")];
        assert_eq!(evaluate(&mods, today()), InterventionState::NoIntervention);
    }

    #[test]
    fn option_c_reply_means_proceed() {
        let alternatives = alternatives_for(InterventionReason::MultipleCancellations);
        assert_eq!(
            classify_reply("option c", &alternatives),
            ReplyChoice::Proceed
        );
        assert_eq!(classify_reply("c", &alternatives), ReplyChoice::Proceed);
    }

    #[test]
    fn letter_and_keyword_replies_classify() {
        let alternatives = alternatives_for(InterventionReason::MultipleCancellations);
        assert_eq!(classify_reply("a", &alternatives), ReplyChoice::A);
        assert_eq!(classify_reply("option b", &alternatives), ReplyChoice::B);
        assert_eq!(
            classify_reply("make them easy please", &alternatives),
            ReplyChoice::A
        );
        assert_eq!(
            classify_reply("just cancel everything", &alternatives),
            ReplyChoice::Proceed
        );
    }

    #[test]
    fn fuzzy_label_match_classifies_near_misses() {
        // No token matches a label word exactly, but the whole reply is a
        // near-miss of the "Recovery week" label.
        let alternatives = alternatives_for(InterventionReason::LongRange);
        assert_eq!(
            classify_reply("recoveryweek", &alternatives),
            ReplyChoice::A
        );
    }

    #[test]
    fn unintelligible_reply_stays_unknown() {
        let alternatives = alternatives_for(InterventionReason::MultipleCancellations);
        assert_eq!(
            classify_reply("the weather was nice", &alternatives),
            ReplyChoice::Unknown
        );
    }

    #[test]
    fn proceed_carries_originals_through_unchanged() {
        let mods = vec![cancel_on("2026-02-16"), cancel_on("2026-02-18")];
        let plan = make_plan(vec![]);
        let translated = translate_choice(
            AlternativeKey::Proceed,
            InterventionReason::MultipleCancellations,
            &mods,
            &plan,
        );
        assert_eq!(translated, mods);
    }

    #[test]
    fn convert_to_easy_rewrites_cancels_into_modifies() {
        let mods = vec![cancel_on("2026-02-16"), cancel_on("2026-02-18")];
        let plan = make_plan(vec![]);
        let translated = translate_choice(
            AlternativeKey::A,
            InterventionReason::MultipleCancellations,
            &mods,
            &plan,
        );
        assert!(translated.iter().all(|m| m.operation == Operation::Modify));
        assert!(
            translated
                .iter()
                .all(|m| m.after.tags.as_deref() == Some(&["easy".to_string()][..]))
        );
    }

    #[test]
    fn reschedule_within_week_picks_free_days() {
        // 2026-02-16 is a Monday; Tuesday is occupied, so Wednesday is next.
        let monday = make_item("2026-02-16");
        let tuesday = make_item("2026-02-17");
        let plan = make_plan(vec![monday.clone(), tuesday]);

        let modification = Modification {
            target_item_id: monday.id,
            target_date: monday.date,
            operation: Operation::Cancel,
            before: Some(monday),
            after: ModificationDelta {
                status: Some(ItemStatus::Cancelled),
                ..ModificationDelta::default()
            },
            reason: String::new(),
        };
        let translated = translate_choice(
            AlternativeKey::B,
            InterventionReason::MultipleCancellations,
            &[modification],
            &plan,
        );
        assert_eq!(translated[0].operation, Operation::Reschedule);
        assert_eq!(translated[0].after.date, Some(date("2026-02-18")));
    }
}
