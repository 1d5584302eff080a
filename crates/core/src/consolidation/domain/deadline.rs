use chrono::NaiveDate;
use serde::Serialize;

use super::text_similarity::normalize;

const LEAD_WORDS: &[&str] = &["by", "on", "before", "due", "until", "no later than"];

const WEEKDAYS: &[(&str, &str)] = &[
    ("monday", "Monday"),
    ("mon", "Monday"),
    ("tuesday", "Tuesday"),
    ("tue", "Tuesday"),
    ("tues", "Tuesday"),
    ("wednesday", "Wednesday"),
    ("wed", "Wednesday"),
    ("thursday", "Thursday"),
    ("thu", "Thursday"),
    ("thurs", "Thursday"),
    ("friday", "Friday"),
    ("fri", "Friday"),
    ("saturday", "Saturday"),
    ("sat", "Saturday"),
    ("sunday", "Sunday"),
    ("sun", "Sunday"),
];

const FIXED_RELATIVE: &[(&str, &str)] = &[
    ("today", "today"),
    ("tonight", "today"),
    ("end of today", "today"),
    ("end of day", "end of day"),
    ("end of the day", "end of day"),
    ("eod", "end of day"),
    ("tomorrow", "tomorrow"),
    ("end of week", "end of week"),
    ("end of the week", "end of week"),
    ("eow", "end of week"),
    ("end of month", "end of month"),
    ("end of the month", "end of month"),
    ("eom", "end of month"),
    ("end of quarter", "end of quarter"),
    ("end of the quarter", "end of quarter"),
    ("end of year", "end of year"),
    ("end of the year", "end of year"),
];

/// Time-of-day qualifiers that may precede or follow a weekday or date.
const TIME_OF_DAY: &[(&str, &str)] = &[
    ("end of the day", "end of day"),
    ("end of day", "end of day"),
    ("close of business", "end of day"),
    ("cob", "end of day"),
    ("eod", "end of day"),
    ("morning", "morning"),
    ("afternoon", "afternoon"),
    ("evening", "evening"),
    ("night", "night"),
    ("noon", "noon"),
    ("midday", "noon"),
];

const TRAILING_CONNECTORS: &[&str] = &["in the", "at", "by"];

const DATED_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%B %d %Y",
    "%d %B %Y",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineKind {
    /// Full calendar date, normalized to `YYYY-MM-DD`.
    Date,
    /// Month and day without a year, normalized to e.g. `February 15`.
    MonthDay,
    /// A specific relative reference such as `Friday` or `end of day`.
    Relative,
    /// Kept as raw text; needs a human to interpret it.
    Unrecognized,
}

/// A deadline as extracted, plus its canonical form when one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deadline {
    pub raw: String,
    /// Canonical form, with any time of day appended (`Friday afternoon`).
    pub normalized: Option<String>,
    pub kind: DeadlineKind,
}

impl Deadline {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let cleaned = strip_lead_words(&normalize_date_text(&raw));

        let classified = classify(&cleaned).or_else(|| {
            let (base, time_of_day) = split_time_of_day(&cleaned)?;
            classify(&base).map(|(text, kind)| (format!("{text} {time_of_day}"), kind))
        });
        let (normalized, kind) = match classified {
            Some((text, kind)) => (Some(text), kind),
            None => (None, DeadlineKind::Unrecognized),
        };

        Self {
            raw,
            normalized,
            kind,
        }
    }

    /// Text shown to users: the canonical form when known, else the raw text.
    pub fn text(&self) -> &str {
        self.normalized.as_deref().unwrap_or(&self.raw)
    }

    /// Key under which equivalent deadlines are counted together.
    pub fn vote_key(&self) -> String {
        match &self.normalized {
            Some(n) => n.to_lowercase(),
            None => normalize(&self.raw),
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.kind != DeadlineKind::Unrecognized
    }

    /// Whether the raw text contains any of the given vague phrases.
    pub fn mentions_any(&self, phrases: &[String]) -> bool {
        let padded = format!(" {} ", normalize(&self.raw));
        phrases.iter().any(|p| {
            let p = normalize(p);
            !p.is_empty() && padded.contains(&format!(" {p} "))
        })
    }
}

/// Lowercases, drops commas, trailing punctuation and ordinal suffixes
/// (`15th` → `15`).
fn normalize_date_text(text: &str) -> String {
    text.to_lowercase()
        .trim_end_matches(['.', '!', '?', ';'])
        .replace(',', " ")
        .split_whitespace()
        .map(|word| {
            let digits = word.trim_end_matches(|c: char| c.is_ascii_alphabetic());
            let suffix = &word[digits.len()..];
            if !digits.is_empty()
                && digits.chars().all(|c| c.is_ascii_digit())
                && matches!(suffix, "st" | "nd" | "rd" | "th")
            {
                digits.to_string()
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_lead_words(text: &str) -> String {
    let mut rest = text.trim();
    while let Some(stripped) = LEAD_WORDS.iter().find_map(|lead| {
        rest.strip_prefix(lead)
            .filter(|after| after.starts_with(' '))
            .map(str::trim_start)
    }) {
        rest = stripped;
    }
    rest.to_string()
}

/// Canonical text and kind for a deadline with no time-of-day qualifier.
fn classify(text: &str) -> Option<(String, DeadlineKind)> {
    if let Some(date) = parse_full_date(text) {
        return Some((date.format("%Y-%m-%d").to_string(), DeadlineKind::Date));
    }
    if let Some(month_day) = parse_month_day(text) {
        return Some((month_day, DeadlineKind::MonthDay));
    }
    if let Some(relative) = parse_relative(text) {
        return Some((relative, DeadlineKind::Relative));
    }

    // `friday march 15`: the weekday only restates the date.
    let (first, rest) = text.split_once(' ')?;
    if !WEEKDAYS.iter().any(|(key, _)| *key == first) {
        return None;
    }
    if let Some(date) = parse_full_date(rest) {
        return Some((date.format("%Y-%m-%d").to_string(), DeadlineKind::Date));
    }
    parse_month_day(rest).map(|month_day| (month_day, DeadlineKind::MonthDay))
}

/// Splits `friday afternoon` or `end of day friday` into the remaining
/// deadline text and the canonical time of day.
fn split_time_of_day(text: &str) -> Option<(String, &'static str)> {
    TIME_OF_DAY.iter().find_map(|(phrase, canonical)| {
        let base = text
            .strip_suffix(phrase)
            .filter(|base| base.ends_with(' '))
            .or_else(|| {
                text.strip_prefix(phrase)
                    .filter(|base| base.starts_with(' '))
            })?;
        let base = strip_trailing_connectors(&strip_lead_words(base));
        (!base.is_empty()).then(|| (base, *canonical))
    })
}

fn strip_trailing_connectors(text: &str) -> String {
    let mut rest = text.trim();
    while let Some(stripped) = TRAILING_CONNECTORS.iter().find_map(|word| {
        rest.strip_suffix(word)
            .filter(|before| before.ends_with(' '))
            .map(str::trim_end)
    }) {
        rest = stripped;
    }
    rest.to_string()
}

fn parse_full_date(text: &str) -> Option<NaiveDate> {
    DATED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| parse_numeric_date(text))
}

/// `dd/mm/yyyy` or `mm/dd/yyyy`, only when the day/month order is evident.
fn parse_numeric_date(text: &str) -> Option<NaiveDate> {
    let parts: Vec<u32> = text
        .split(['/', '.'])
        .map(|p| p.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    let [a, b, year] = parts.as_slice() else {
        return None;
    };
    if *year < 1000 {
        return None;
    }
    let (month, day) = match (*a > 12, *b > 12) {
        (true, false) => (*b, *a),
        (false, true) => (*a, *b),
        (false, false) if a == b => (*a, *b),
        _ => return None,
    };
    NaiveDate::from_ymd_opt(*year as i32, month, day)
}

fn parse_month_day(text: &str) -> Option<String> {
    // Leap year so that February 29 is accepted.
    let with_year = format!("{text} 2000");
    ["%B %d %Y", "%d %B %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&with_year, fmt).ok())
        .map(|date| date.format("%B %-d").to_string())
}

fn parse_relative(text: &str) -> Option<String> {
    if let Some((_, canonical)) = FIXED_RELATIVE.iter().find(|(phrase, _)| *phrase == text) {
        return Some(canonical.to_string());
    }

    let (prefix, day) = match text.split_once(' ') {
        Some((first @ ("this" | "next" | "coming"), rest)) => (Some(first), rest),
        _ => (None, text),
    };
    if let Some((_, name)) = WEEKDAYS.iter().find(|(key, _)| *key == day) {
        return Some(match prefix {
            Some("next") => format!("next {name}"),
            _ => name.to_string(),
        });
    }

    parse_in_n_units(text)
}

/// `in 3 days`, `in 2 weeks`.
fn parse_in_n_units(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split(' ').collect();
    let ["in", count, unit] = words.as_slice() else {
        return None;
    };
    let n: u32 = count.parse().ok()?;
    let unit = unit.trim_end_matches('s');
    matches!(unit, "hour" | "day" | "week" | "month").then(|| {
        if n == 1 {
            format!("in 1 {unit}")
        } else {
            format!("in {n} {unit}s")
        }
    })
}
