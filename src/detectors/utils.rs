//! Text heuristics shared by the detectors.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};
use regex::Regex;
use std::sync::LazyLock;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern is valid")
}

pub static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\$\s?(\d{1,3}(?:,\d{3})*(?:\.\d{2})?|\d+(?:\.\d{2})?)"));
pub static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"));
pub static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?:\+?1[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]\d{4}"));
pub static URL_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"https?://[^\s]+"));
static TIME_12H_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(\d{1,2})(?::([0-5]\d))?\s?([ap])\.?m\.?\b"));
static TIME_24H_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\b([01]?\d|2[0-3]):([0-5]\d)\b"));
static NUMERIC_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b"));
static LONG_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|sept|oct|nov|dec)\.?\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s+(\d{4}))?",
    )
});
static RELATIVE_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)\b(today|tonight|tomorrow|(?:(this|next)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday))\b",
    )
});
pub static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"\b\d{1,5}\s+(?:[A-Z][A-Za-z]*\s+){1,4}(?:St|Street|Ave|Avenue|Rd|Road|Dr|Drive|Blvd|Boulevard|Ln|Lane|Way|Ct|Court)\b\.?(?:,[^\n]*)?",
    )
});
static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^(?:[-•*]|\[\s?\])\s+(.+)$"));
static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^\d{1,2}[.)]\s+(.+)$"));
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"[A-Za-z0-9']+"));

/// Non-empty trimmed lines.
pub fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

pub fn word_count(text: &str) -> usize {
    WORD_RE.find_iter(text).count()
}

/// Whether `needle` occurs in `haystack` on word boundaries. Both are
/// expected lowercase.
pub fn contains_term(haystack: &str, needle: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric();
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

pub fn count_terms(haystack: &str, needles: &[&str]) -> usize {
    needles
        .iter()
        .filter(|n| contains_term(haystack, n))
        .count()
}

pub fn bullet_items(text: &str) -> Vec<String> {
    lines(text)
        .filter_map(|l| BULLET_RE.captures(l))
        .map(|c| c[1].trim().to_string())
        .collect()
}

pub fn numbered_items(text: &str) -> Vec<String> {
    lines(text)
        .filter_map(|l| NUMBERED_RE.captures(l))
        .map(|c| c[1].trim().to_string())
        .collect()
}

/// Parses `$1,500.00` style amounts into a number.
pub fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim_start_matches('$')
        .trim()
        .replace(',', "")
        .parse()
        .ok()
}

pub fn first_price(text: &str) -> Option<String> {
    AMOUNT_RE.find(text).map(|m| m.as_str().replace(' ', ""))
}

/// Value of the first line starting with one of `labels`, case-insensitive.
/// The label may be followed by `:`, `#`, or whitespace.
pub fn labelled_value(text: &str, labels: &[&str]) -> Option<String> {
    lines(text).find_map(|line| {
        let lower = line.to_lowercase();
        labels.iter().find_map(|label| {
            let rest = lower.strip_prefix(label)?;
            let separated = rest.starts_with([':', '#', ' ', '\t']) || rest.is_empty();
            if !separated {
                return None;
            }
            let value = line
                .get(label.len()..)?
                .trim_start_matches([':', '#', ' ', '\t'])
                .trim();
            (!value.is_empty()).then(|| value.to_string())
        })
    })
}

/// Amount on the first line starting with one of `labels`.
pub fn labelled_amount(text: &str, labels: &[&str]) -> Option<f64> {
    lines(text).find_map(|line| {
        let lower = line.to_lowercase();
        if !labels.iter().any(|l| lower.starts_with(l)) {
            return None;
        }
        AMOUNT_RE.captures(line).and_then(|c| parse_amount(&c[1]))
    })
}

/// First time of day, normalised to `HH:MM`.
pub fn first_time(text: &str) -> Option<String> {
    let twelve = TIME_12H_RE.captures(text).and_then(|c| {
        let hour: u32 = c[1].parse().ok()?;
        let minute: u32 = c.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = c[3].eq_ignore_ascii_case("p");
        let hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
        Some((c.get(0)?.start(), format!("{hour:02}:{minute:02}")))
    });
    let twenty_four = TIME_24H_RE.captures(text).and_then(|c| {
        let hour: u32 = c[1].parse().ok()?;
        let minute: u32 = c[2].parse().ok()?;
        Some((c.get(0)?.start(), format!("{hour:02}:{minute:02}")))
    });

    // Prefer whichever occurs first; "3:00 PM" matches both at the same offset.
    match (twelve, twenty_four) {
        (Some(a), Some(b)) if b.0 < a.0 => Some(b.1),
        (Some(a), _) => Some(a.1),
        (None, b) => b.map(|b| b.1),
    }
}

fn month_number(name: &str) -> Option<u32> {
    let month = match &name.to_lowercase()[..3] {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// `June 15, 2025`, `May 1st`. A missing year defaults to the reference year.
pub fn long_date(text: &str, reference: NaiveDate) -> Option<NaiveDate> {
    let c = LONG_DATE_RE.captures(text)?;
    let month = month_number(&c[1])?;
    let day: u32 = c[2].parse().ok()?;
    let year = match c.get(3) {
        Some(y) => y.as_str().parse().ok()?,
        None => reference.year(),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `04/03/2025` read as month/day/year.
pub fn numeric_date(text: &str) -> Option<NaiveDate> {
    let c = NUMERIC_DATE_RE.captures(text)?;
    let month: u32 = c[1].parse().ok()?;
    let day: u32 = c[2].parse().ok()?;
    let mut year: i32 = c[3].parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn weekday(name: &str) -> Option<Weekday> {
    name.parse().ok()
}

/// Resolves `today`, `tomorrow`, `this Saturday`, `next friday` against `now`.
/// A bare or `this` weekday is the next occurrence including today; `next`
/// skips a further week.
pub fn relative_date(text: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    let today = now.date_naive();
    let c = RELATIVE_DAY_RE.captures(text)?;
    let word = c[1].to_lowercase();
    match word.as_str() {
        "today" | "tonight" => return Some(today),
        "tomorrow" => return today.checked_add_days(Days::new(1)),
        _ => {}
    }
    let target = weekday(c.get(3)?.as_str())?;
    let ahead = (7 + target.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
    let extra = match c.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(q) if q == "next" => 7,
        _ => 0,
    };
    today.checked_add_days(Days::new(u64::from(ahead + extra)))
}

/// Any date the text mentions: explicit forms win over relative ones.
pub fn any_date(text: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    long_date(text, now.date_naive())
        .or_else(|| numeric_date(text))
        .or_else(|| relative_date(text, now))
}
