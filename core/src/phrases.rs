use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::dates::{normalize_weekday, weekday_name};

/// Weekday alternation shared by both scanners. Longer forms first so the
/// regex engine never stops at a prefix ("thursday" before "thurs" before
/// "thu"); an optional possessive/plural suffix keeps "tuesday's" and
/// "tuesdays" as one token.
const WEEKDAY_PATTERN: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday\
|tues|thurs|thur|weds|mon|tue|wed|thu|fri|sat|sun";

static QUALIFIED_RE: LazyLock<Regex> = LazyLock::new(|| {
    let weekday_branch =
        format!(r"|(?P<qualifier>next|last|this)\s+(?P<qweekday>{WEEKDAY_PATTERN})(?:'s|s)?");
    let pattern = [
        r"(?i)\b(?:(?P<rel>today|tomorrow|yesterday)",
        r"|(?P<iso>\d{4}-\d{2}-\d{2})",
        weekday_branch.as_str(),
        r"|(?P<week>(?:this|next)\s+week)",
        r"|(?P<nextn>next\s+\d{1,3}\s+(?:days?|weeks?)))\b",
    ]
    .concat();
    Regex::new(&pattern).expect("invalid qualified-phrase regex")
});

static BARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?P<bweekday>{WEEKDAY_PATTERN})(?:'s|s)?\b"
    ))
    .expect("invalid bare-weekday regex")
});

/// A date-referring phrase found in a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedPhrase {
    /// Raw matched text, as the user typed it.
    pub phrase: String,
    /// Canonical form; the key clarifications are tracked under.
    pub normalized: String,
    /// Byte span within the message.
    pub span: (usize, usize),
    /// Bare weekday with no qualifier; inherently ambiguous.
    pub ambiguous: bool,
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Scan a message for date-referring phrases. Qualified phrases (absolute
/// dates, today/tomorrow/yesterday, `next|last|this <weekday>`, week and
/// N-day ranges) come back unambiguous; a bare weekday is ambiguous. A bare
/// match overlapping a qualified match's span is discarded: "next tuesday"
/// is one phrase, not two. Output is ordered by position.
pub fn extract_date_phrases(message: &str) -> Vec<ExtractedPhrase> {
    let mut phrases: Vec<ExtractedPhrase> = Vec::new();

    for captures in QUALIFIED_RE.captures_iter(message) {
        let whole = captures.get(0).expect("match without group 0");
        let normalized = if let Some(rel) = captures.name("rel") {
            rel.as_str().to_lowercase()
        } else if let Some(iso) = captures.name("iso") {
            iso.as_str().to_string()
        } else if let (Some(qualifier), Some(weekday)) =
            (captures.name("qualifier"), captures.name("qweekday"))
        {
            let Some(canonical) = normalize_weekday(weekday.as_str()) else {
                continue;
            };
            format!(
                "{} {}",
                qualifier.as_str().to_lowercase(),
                weekday_name(canonical)
            )
        } else {
            // Week and N-day range branches normalize by case and spacing.
            collapse_whitespace(&whole.as_str().to_lowercase())
        };

        phrases.push(ExtractedPhrase {
            phrase: whole.as_str().to_string(),
            normalized,
            span: (whole.start(), whole.end()),
            ambiguous: false,
        });
    }

    for captures in BARE_RE.captures_iter(message) {
        let whole = captures.get(0).expect("match without group 0");
        let overlaps_qualified = phrases
            .iter()
            .any(|phrase| whole.start() < phrase.span.1 && phrase.span.0 < whole.end());
        if overlaps_qualified {
            continue;
        }
        let Some(canonical) = normalize_weekday(whole.as_str()) else {
            continue;
        };
        phrases.push(ExtractedPhrase {
            phrase: whole.as_str().to_string(),
            normalized: weekday_name(canonical).to_string(),
            span: (whole.start(), whole.end()),
            ambiguous: true,
        });
    }

    phrases.sort_by_key(|phrase| phrase.span.0);
    phrases
}

#[cfg(test)]
mod tests {
    use super::extract_date_phrases;

    #[test]
    fn qualified_weekday_swallows_its_bare_weekday() {
        let phrases = extract_date_phrases("move next tuesday's run please");
        assert_eq!(phrases.len(), 1);
        assert_eq!(phrases[0].normalized, "next tuesday");
        assert!(!phrases[0].ambiguous);
    }

    #[test]
    fn bare_weekday_is_flagged_ambiguous() {
        let phrases = extract_date_phrases("can we move the long run to Thursday?");
        assert_eq!(phrases.len(), 1);
        assert_eq!(phrases[0].normalized, "thursday");
        assert!(phrases[0].ambiguous);
        assert_eq!(phrases[0].phrase, "Thursday");
    }

    #[test]
    fn mixed_message_keeps_positional_order() {
        let phrases =
            extract_date_phrases("cancel tomorrow and move Friday's session to 2026-03-02");
        let normalized: Vec<&str> = phrases.iter().map(|p| p.normalized.as_str()).collect();
        assert_eq!(normalized, vec!["tomorrow", "friday", "2026-03-02"]);
        assert!(phrases[1].ambiguous);
        assert!(!phrases[2].ambiguous);
    }

    #[test]
    fn week_ranges_are_qualified() {
        let phrases = extract_date_phrases("take next week off, then next 3 days easy");
        let normalized: Vec<&str> = phrases.iter().map(|p| p.normalized.as_str()).collect();
        assert_eq!(normalized, vec!["next week", "next 3 days"]);
        assert!(phrases.iter().all(|p| !p.ambiguous));
    }

    #[test]
    fn abbreviated_weekdays_normalize() {
        let phrases = extract_date_phrases("swap tues and thurs");
        let normalized: Vec<&str> = phrases.iter().map(|p| p.normalized.as_str()).collect();
        assert_eq!(normalized, vec!["tuesday", "thursday"]);
        assert!(phrases.iter().all(|p| p.ambiguous));
    }

    #[test]
    fn plain_text_yields_nothing() {
        assert!(extract_date_phrases("how is my training going?").is_empty());
    }
}
