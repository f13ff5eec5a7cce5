use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Resolves date language against an explicit reference date. The only
/// wall-clock read in the crate is [`DateResolver::today`]; every other
/// function here is a pure function of its inputs, so resolution is
/// deterministic and replayable.
///
/// All arithmetic happens on `NaiveDate`, a plain calendar date with no
/// time-of-day, so daylight-saving transitions and midnight rounding cannot
/// perturb whole-day math. The timezone matters exactly once: deciding which
/// calendar date "now" falls on.
#[derive(Debug, Clone, Copy)]
pub struct DateResolver {
    tz: Tz,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateError {
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
    #[error("unrecognized date phrase '{0}'")]
    UnrecognizedPhrase(String),
}

impl DateResolver {
    pub fn new(timezone: &str) -> Result<Self, DateError> {
        let tz = Tz::from_str(timezone)
            .map_err(|_| DateError::UnknownTimezone(timezone.to_string()))?;
        Ok(Self { tz })
    }

    /// Today's calendar date in the plan timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }
}

/// Whole-day arithmetic. Round-trip law: `add_days(add_days(d, n), -n) == d`
/// for every valid date and offset.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date + Duration::days(days)
}

pub fn weekday_of(date: NaiveDate) -> Weekday {
    date.weekday()
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

const WEEKDAY_NAMES: &[(&str, Weekday)] = &[
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

fn weekday_prefix_match(token: &str) -> Option<Weekday> {
    // Three letters is the shortest unambiguous abbreviation in use.
    if token.len() < 3 {
        return None;
    }
    WEEKDAY_NAMES
        .iter()
        .find_map(|(name, weekday)| name.starts_with(token).then_some(*weekday))
}

/// Canonicalize a weekday token: abbreviations ("tue", "thurs"), possessive
/// ("tuesday's") and plural ("tuesdays") forms all map to the weekday.
/// "weds" is not a prefix of "wednesday", so the plural strip runs second.
pub fn normalize_weekday(token: &str) -> Option<Weekday> {
    let lowered = token.trim().to_lowercase();
    let base = lowered.strip_suffix("'s").unwrap_or(lowered.as_str());
    if let Some(weekday) = weekday_prefix_match(base) {
        return Some(weekday);
    }
    base.strip_suffix('s').and_then(weekday_prefix_match)
}

/// A candidate date offered when a phrase is ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DateOption {
    pub date: NaiveDate,
    pub label: String,
}

/// An inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of calendar days covered, endpoints inclusive.
    pub fn count_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Result of resolving a single date phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhraseResolution {
    Date(NaiveDate),
    Range(DateRange),
    /// Exactly two labelled candidates plus the question to ask. Guessing
    /// between them is the one thing this module refuses to do.
    Ambiguous {
        options: Vec<DateOption>,
        question: String,
    },
}

/// Resolve a single-date phrase against a reference date.
///
/// today/tomorrow/yesterday map to offsets 0/+1/-1. `next <weekday>` is the
/// nearest strictly-future occurrence (a weekday equal to today's rolls to
/// +7); `last <weekday>` the nearest strictly-past one; `this <weekday>` the
/// occurrence inside the Monday–Sunday week containing today. A bare weekday
/// is always ambiguous: two candidates, most recent past and nearest future.
/// ISO dates pass through unchanged.
pub fn resolve_relative_phrase(
    phrase: &str,
    today: NaiveDate,
) -> Result<PhraseResolution, DateError> {
    let normalized = phrase.trim().to_lowercase();

    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
        return Ok(PhraseResolution::Date(date));
    }

    match normalized.as_str() {
        "today" => return Ok(PhraseResolution::Date(today)),
        "tomorrow" => return Ok(PhraseResolution::Date(add_days(today, 1))),
        "yesterday" => return Ok(PhraseResolution::Date(add_days(today, -1))),
        _ => {}
    }

    if let Some((qualifier, rest)) = normalized.split_once(char::is_whitespace) {
        if let Some(target) = normalize_weekday(rest) {
            let resolved = match qualifier {
                "next" => next_occurrence(today, target),
                "last" => last_occurrence(today, target),
                "this" => within_current_week(today, target),
                _ => return Err(DateError::UnrecognizedPhrase(phrase.to_string())),
            };
            return Ok(PhraseResolution::Date(resolved));
        }
        return Err(DateError::UnrecognizedPhrase(phrase.to_string()));
    }

    if let Some(target) = normalize_weekday(&normalized) {
        return Ok(bare_weekday_ambiguity(today, target));
    }

    Err(DateError::UnrecognizedPhrase(phrase.to_string()))
}

static NEXT_N_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^next\s+(\d{1,3})\s+(day|week)s?$").expect("invalid next-N regex")
});

/// Resolve a range phrase: "this week" (Monday–Sunday containing today),
/// "next week", "next N days" (starting tomorrow), "next N weeks".
pub fn resolve_relative_range(phrase: &str, today: NaiveDate) -> Result<DateRange, DateError> {
    let normalized = phrase
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let monday = add_days(today, -i64::from(today.weekday().num_days_from_monday()));
    match normalized.as_str() {
        "this week" => {
            return Ok(DateRange {
                start: monday,
                end: add_days(monday, 6),
            });
        }
        "next week" => {
            return Ok(DateRange {
                start: add_days(monday, 7),
                end: add_days(monday, 13),
            });
        }
        _ => {}
    }

    if let Some(captures) = NEXT_N_RE.captures(&normalized) {
        let count: i64 = captures[1]
            .parse()
            .map_err(|_| DateError::UnrecognizedPhrase(phrase.to_string()))?;
        if count == 0 {
            return Err(DateError::UnrecognizedPhrase(phrase.to_string()));
        }
        let days = match &captures[2] {
            "week" => count * 7,
            _ => count,
        };
        let start = add_days(today, 1);
        return Ok(DateRange {
            start,
            end: add_days(start, days - 1),
        });
    }

    Err(DateError::UnrecognizedPhrase(phrase.to_string()))
}

/// Resolve any supported phrase, single date or range.
pub fn resolve_phrase(phrase: &str, today: NaiveDate) -> Result<PhraseResolution, DateError> {
    match resolve_relative_phrase(phrase, today) {
        Ok(resolution) => Ok(resolution),
        Err(DateError::UnrecognizedPhrase(_)) => {
            resolve_relative_range(phrase, today).map(PhraseResolution::Range)
        }
        Err(other) => Err(other),
    }
}

fn next_occurrence(today: NaiveDate, target: Weekday) -> NaiveDate {
    let today_index = i64::from(today.weekday().num_days_from_monday());
    let target_index = i64::from(target.num_days_from_monday());
    let mut delta = (target_index - today_index).rem_euclid(7);
    if delta == 0 {
        delta = 7;
    }
    add_days(today, delta)
}

fn last_occurrence(today: NaiveDate, target: Weekday) -> NaiveDate {
    let today_index = i64::from(today.weekday().num_days_from_monday());
    let target_index = i64::from(target.num_days_from_monday());
    let mut delta = (today_index - target_index).rem_euclid(7);
    if delta == 0 {
        delta = 7;
    }
    add_days(today, -delta)
}

fn within_current_week(today: NaiveDate, target: Weekday) -> NaiveDate {
    let monday = add_days(today, -i64::from(today.weekday().num_days_from_monday()));
    add_days(monday, i64::from(target.num_days_from_monday()))
}

fn bare_weekday_ambiguity(today: NaiveDate, target: Weekday) -> PhraseResolution {
    let past = last_occurrence(today, target);
    let future = next_occurrence(today, target);
    let name = weekday_name(target);
    let options = vec![
        DateOption {
            date: past,
            label: format!("last {name} ({past})"),
        },
        DateOption {
            date: future,
            label: format!("next {name} ({future})"),
        },
    ];
    let question = format!(
        "Which {name} do you mean: last {name} ({past}) or next {name} ({future})?"
    );
    PhraseResolution::Ambiguous { options, question }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, NaiveDate, Weekday};

    use super::{
        DateRange, DateResolver, PhraseResolution, add_days, normalize_weekday,
        resolve_relative_phrase, resolve_relative_range,
    };

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    // Reference date used throughout: Wednesday.
    fn wednesday() -> NaiveDate {
        let d = date("2026-02-11");
        assert_eq!(d.weekday(), Weekday::Wed);
        d
    }

    fn resolved(phrase: &str, today: NaiveDate) -> NaiveDate {
        match resolve_relative_phrase(phrase, today).unwrap() {
            PhraseResolution::Date(d) => d,
            other => panic!("expected a resolved date, got {other:?}"),
        }
    }

    #[test]
    fn offsets_for_today_tomorrow_yesterday() {
        let today = wednesday();
        assert_eq!(resolved("today", today), today);
        assert_eq!(resolved("tomorrow", today), date("2026-02-12"));
        assert_eq!(resolved("yesterday", today), date("2026-02-10"));
    }

    #[test]
    fn next_weekday_is_strictly_future() {
        let today = wednesday();
        assert_eq!(resolved("next thursday", today), date("2026-02-12"));
        // Today is Wednesday: "next wednesday" rolls a full week forward.
        assert_eq!(resolved("next wednesday", today), date("2026-02-18"));
    }

    #[test]
    fn last_weekday_is_strictly_past() {
        let today = wednesday();
        assert_eq!(resolved("last tuesday", today), date("2026-02-10"));
        assert_eq!(resolved("last wednesday", today), date("2026-02-04"));
    }

    #[test]
    fn this_weekday_stays_in_current_week() {
        let today = wednesday();
        assert_eq!(resolved("this friday", today), date("2026-02-13"));
        assert_eq!(resolved("this monday", today), date("2026-02-09"));
    }

    #[test]
    fn bare_weekday_is_always_ambiguous_with_two_options() {
        let today = wednesday();
        let PhraseResolution::Ambiguous { options, question } =
            resolve_relative_phrase("tuesday", today).unwrap()
        else {
            panic!("bare weekday must be ambiguous");
        };
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].date, date("2026-02-10"));
        assert_eq!(options[1].date, date("2026-02-17"));
        assert!(question.contains("tuesday"));
    }

    #[test]
    fn bare_weekday_matching_today_offers_past_and_future() {
        let today = wednesday();
        let PhraseResolution::Ambiguous { options, .. } =
            resolve_relative_phrase("wednesday", today).unwrap()
        else {
            panic!("bare weekday must be ambiguous");
        };
        assert_eq!(options.len(), 2);
        assert!(options[0].date <= today);
        assert!(options[1].date >= today);
        assert_eq!(options[0].date, date("2026-02-04"));
        assert_eq!(options[1].date, date("2026-02-18"));
    }

    #[test]
    fn iso_dates_pass_through() {
        assert_eq!(resolved("2026-07-04", wednesday()), date("2026-07-04"));
    }

    #[test]
    fn add_days_round_trips_across_dst_boundaries() {
        // 2026-03-29 is the EU spring-forward date; 2026-10-25 falls back.
        for start in ["2026-03-28", "2026-10-24", "2026-02-11"] {
            let d = date(start);
            for n in [-1000i64, -7, -1, 0, 1, 7, 1000] {
                assert_eq!(add_days(add_days(d, n), -n), d, "start={start} n={n}");
            }
        }
    }

    #[test]
    fn weekday_normalization_handles_real_world_forms() {
        assert_eq!(normalize_weekday("tue"), Some(Weekday::Tue));
        assert_eq!(normalize_weekday("Tues"), Some(Weekday::Tue));
        assert_eq!(normalize_weekday("tuesday's"), Some(Weekday::Tue));
        assert_eq!(normalize_weekday("tuesdays"), Some(Weekday::Tue));
        assert_eq!(normalize_weekday("weds"), Some(Weekday::Wed));
        assert_eq!(normalize_weekday("THURS"), Some(Weekday::Thu));
        assert_eq!(normalize_weekday("sundays"), Some(Weekday::Sun));
        assert_eq!(normalize_weekday("tu"), None);
        assert_eq!(normalize_weekday("someday"), None);
    }

    #[test]
    fn this_week_is_monday_through_sunday() {
        let range = resolve_relative_range("this week", wednesday()).unwrap();
        assert_eq!(
            range,
            DateRange {
                start: date("2026-02-09"),
                end: date("2026-02-15"),
            }
        );
        assert_eq!(range.count_days(), 7);
    }

    #[test]
    fn next_week_follows_current_week() {
        let range = resolve_relative_range("next week", wednesday()).unwrap();
        assert_eq!(range.start, date("2026-02-16"));
        assert_eq!(range.end, date("2026-02-22"));
    }

    #[test]
    fn next_n_days_starts_tomorrow() {
        let range = resolve_relative_range("next 10 days", wednesday()).unwrap();
        assert_eq!(range.start, date("2026-02-12"));
        assert_eq!(range.count_days(), 10);

        let range = resolve_relative_range("next 2 weeks", wednesday()).unwrap();
        assert_eq!(range.start, date("2026-02-12"));
        assert_eq!(range.count_days(), 14);
    }

    #[test]
    fn zero_day_ranges_are_rejected() {
        assert!(resolve_relative_range("next 0 days", wednesday()).is_err());
    }

    #[test]
    fn resolver_rejects_unknown_timezone() {
        assert!(DateResolver::new("Mars/Olympus").is_err());
        assert!(DateResolver::new("Europe/Berlin").is_ok());
    }
}
