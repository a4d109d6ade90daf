//! Entity Normalizer: canonicalizes actor names/roles and date strings.
//!
//! Everything here is deterministic and pure. Date parsing never guesses —
//! an ambiguous or unparseable expression yields `None` and the caller keeps
//! the event without a date.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

use crate::config::ResolutionConfig;
use crate::models::enums::DatePrecision;

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// Titles and honorifics stripped during name normalization.
const HONORIFICS: &[&str] = &[
    "judge", "hon", "honorable", "justice", "attorney", "counsel", "esq", "esquire",
    "caseworker", "mr", "mrs", "ms", "dr", "gal",
];

/// Canonical form of an actor name: case-folded, honorifics stripped,
/// edge punctuation removed, whitespace collapsed.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|token| !token.is_empty() && !HONORIFICS.contains(&token.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Levenshtein distance over characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Whether two normalized names refer to the same person, within the
/// configured tolerance. Short names must match exactly — fuzzy matching on
/// them would conflate distinct people.
pub fn names_match(a: &str, b: &str, config: &ResolutionConfig) -> bool {
    if a == b {
        return true;
    }
    if a.len() < config.min_len_for_fuzzy || b.len() < config.min_len_for_fuzzy {
        return false;
    }
    edit_distance(a, b) <= config.max_edit_distance
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Exact formats tried in order. `%y` maps 00–68 to 2000s per chrono, and
/// must come before `%Y`, which would read a two-digit year as year 24.
const DATE_FORMATS: &[&str] = &[
    "%m/%d/%y", "%m-%d-%y", "%m/%d/%Y", "%m-%d-%Y",
    "%B %d, %Y", "%b %d, %Y", "%B %d %Y", "%b %d %Y",
    "%Y-%m-%d",
];

/// Years outside this window are treated as parse noise, not dates.
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=2100;

static RE_RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(\d{1,3}|[a-z]+(?:-[a-z]+)?)\s+(days?|weeks?)\s+(?:after|following)\s+(?:the\s+)?(filing|petition|removal)$",
    )
    .expect("relative date regex is valid")
});

/// Small spelled numbers seen in relative deadline phrases.
fn spelled_number(word: &str) -> Option<i64> {
    let value = match word {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "fourteen" => 14,
        "fifteen" => 15,
        "twenty" => 20,
        "twenty-one" => 21,
        "thirty" => 30,
        "forty-five" => 45,
        "sixty" => 60,
        "ninety" => 90,
        _ => return None,
    };
    Some(value)
}

/// Parse an exact calendar date expression. Returns `None` for anything
/// ambiguous rather than guessing a day/month order.
pub fn parse_exact_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim().replace("  ", " ");
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            if YEAR_RANGE.contains(&date.year()) {
                return Some(date);
            }
        }
    }
    None
}

/// Parse a date expression, resolving relative phrases ("fourteen days after
/// filing") against the anchor date when one is known.
pub fn parse_date_expr(raw: &str, anchor: Option<NaiveDate>) -> Option<(NaiveDate, DatePrecision)> {
    if let Some(date) = parse_exact_date(raw) {
        return Some((date, DatePrecision::Exact));
    }

    let caps = RE_RELATIVE.captures(raw.trim())?;
    let anchor = anchor?;

    let quantity_text = caps[1].to_lowercase();
    let quantity: i64 = quantity_text
        .parse()
        .ok()
        .or_else(|| spelled_number(&quantity_text))?;
    let unit_days = if caps[2].to_lowercase().starts_with("week") { 7 } else { 1 };

    let date = anchor + Duration::days(quantity * unit_days);
    Some((date, DatePrecision::Relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // ── Names ──────────────────────────────────────────────────────────

    #[test]
    fn normalize_strips_honorifics_and_case() {
        assert_eq!(normalize_name("JUDGE William  Smith"), "william smith");
        assert_eq!(normalize_name("Hon. Sarah O'Brien"), "sarah o'brien");
        assert_eq!(normalize_name("Mary Jones, Esq."), "mary jones");
    }

    #[test]
    fn edit_distance_basic() {
        assert_eq!(edit_distance("smith", "smith"), 0);
        assert_eq!(edit_distance("smith", "smyth"), 1);
        assert_eq!(edit_distance("smith", "smithe"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn names_match_respects_fuzzy_floor() {
        let config = ResolutionConfig::default();
        assert!(names_match("william smith", "william smyth", &config));
        // "li" vs "lo" is 1 edit but below the fuzzy length floor.
        assert!(!names_match("li", "lo", &config));
        assert!(names_match("li", "li", &config));
    }

    // ── Dates ──────────────────────────────────────────────────────────

    #[test]
    fn parses_numeric_formats() {
        assert_eq!(parse_exact_date("01/05/2024"), Some(d(2024, 1, 5)));
        assert_eq!(parse_exact_date("01-05-2024"), Some(d(2024, 1, 5)));
        assert_eq!(parse_exact_date("2024-01-05"), Some(d(2024, 1, 5)));
        assert_eq!(parse_exact_date("3/7/24"), Some(d(2024, 3, 7)));
    }

    #[test]
    fn two_digit_years_land_in_the_current_century() {
        assert_eq!(parse_exact_date("01/05/24"), Some(d(2024, 1, 5)));
        assert_eq!(parse_exact_date("12-31-99"), Some(d(1999, 12, 31)));
        // A four-digit year is never re-read as two-digit.
        assert_eq!(parse_exact_date("01/05/2024"), Some(d(2024, 1, 5)));
    }

    #[test]
    fn implausible_years_are_rejected() {
        assert_eq!(parse_exact_date("01/05/0024"), None);
        assert_eq!(parse_exact_date("01/05/3024"), None);
    }

    #[test]
    fn parses_spelled_months() {
        assert_eq!(parse_exact_date("January 5, 2024"), Some(d(2024, 1, 5)));
        assert_eq!(parse_exact_date("Jan 5 2024"), Some(d(2024, 1, 5)));
        assert_eq!(parse_exact_date("March 15 2023"), Some(d(2023, 3, 15)));
    }

    #[test]
    fn ambiguous_dates_are_not_guessed() {
        // Day-first ordering is never assumed.
        assert_eq!(parse_exact_date("32/01/2024"), None);
        assert_eq!(parse_exact_date("sometime in May"), None);
        assert_eq!(parse_exact_date(""), None);
    }

    #[test]
    fn relative_dates_resolve_against_anchor() {
        let anchor = d(2024, 1, 1);
        assert_eq!(
            parse_date_expr("14 days after filing", Some(anchor)),
            Some((d(2024, 1, 15), DatePrecision::Relative))
        );
        assert_eq!(
            parse_date_expr("fourteen days after the filing", Some(anchor)),
            Some((d(2024, 1, 15), DatePrecision::Relative))
        );
        assert_eq!(
            parse_date_expr("two weeks after removal", Some(anchor)),
            Some((d(2024, 1, 15), DatePrecision::Relative))
        );
    }

    #[test]
    fn relative_without_anchor_is_unresolved() {
        assert_eq!(parse_date_expr("14 days after filing", None), None);
    }

    #[test]
    fn exact_dates_ignore_anchor() {
        assert_eq!(
            parse_date_expr("01/05/2024", Some(d(2020, 6, 6))),
            Some((d(2024, 1, 5), DatePrecision::Exact))
        );
    }
}
