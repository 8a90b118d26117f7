//! Typing of raw extracted values
//!
//! Sites render numbers and dates for people ("1,234 reviews", "Mar 2023",
//! "Date of stay: March 2023"). These helpers turn them into column values;
//! anything unparseable comes back as `None` and is stored as a sentinel.

use crate::crawler::parser::{ExtractError, RawRecord, RawValue};
use chrono::{Datelike, Duration, NaiveDate};

/// Delimiter for flattened multi-valued fields
pub const LIST_DELIMITER: &str = ",";

/// Reads the first integer, ignoring thousands separators
///
/// `"1,234 reviews"` → 1234, `"#12 of 1,000"` → 12
pub fn parse_count(text: &str) -> Option<i64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let mut digits = String::new();
    let mut chars = text[start..].chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if c == ',' && chars.peek().map_or(false, |n| n.is_ascii_digit()) {
            continue;
        } else {
            break;
        }
    }

    digits.parse().ok()
}

/// Reads the first decimal number, ignoring thousands separators
///
/// `"4.5 of 5 bubbles"` → 4.5, `"$1,200"` → 1200.0
pub fn parse_decimal(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let mut number = String::new();
    let mut seen_point = false;
    let mut chars = text[start..].chars().peekable();

    while let Some(c) = chars.next() {
        let next_is_digit = chars.peek().map_or(false, |n| n.is_ascii_digit());
        match c {
            '0'..='9' => number.push(c),
            ',' if next_is_digit && !seen_point => continue,
            '.' if next_is_digit && !seen_point => {
                seen_point = true;
                number.push(c);
            }
            _ => break,
        }
    }

    number.parse().ok()
}

/// Splits a price range such as `"$100 - $300 (Based on Average Rates)"`
pub fn parse_price_range(text: &str) -> Option<(f64, f64)> {
    let (low, high) = text.split_once(['-', '–'])?;
    Some((parse_decimal(low)?, parse_decimal(high)?))
}

/// Maps an English month name or abbreviation to 1-12
pub fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = name
        .trim_matches(|c: char| !c.is_alphabetic())
        .to_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|i| i as u32 + 1)
}

/// Finds `(month, year)` in free text
///
/// The last month name wins. The year is the first number ≥ 2000 after it;
/// when only a day of month follows (`"Mar 12"`), the year of `today` is used.
fn month_and_year(text: &str, today: NaiveDate) -> Option<(u32, i32)> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let (position, month) = tokens
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, token)| month_number(token).map(|m| (i, m)))?;

    let year = tokens[position + 1..]
        .iter()
        .filter_map(|token| parse_count(token))
        .find(|n| *n >= 2000)
        .map(|n| n as i32)
        .unwrap_or_else(|| today.year());

    Some((month, year))
}

/// Parses the date a review was written
///
/// Handles `"Mar 2023"`, `"Written March 12, 2023"`, `"Mar 12"` (current
/// year), and the relative forms `"today"` and `"yesterday"`.
pub fn parse_review_date(text: &str, today: NaiveDate) -> Option<(u32, i32)> {
    let lower = text.to_lowercase();
    if lower.contains("yesterday") {
        let date = today - Duration::days(1);
        return Some((date.month(), date.year()));
    }
    if lower.contains("today") {
        return Some((today.month(), today.year()));
    }
    month_and_year(text, today)
}

/// Parses `"Date of stay: March 2023"` into `(month, year)`
pub fn parse_stay_date(text: &str, today: NaiveDate) -> Option<(u32, i32)> {
    let value = text.rsplit(':').next().unwrap_or(text);
    month_and_year(value, today)
}

/// Display slug of a profile URL: the part after `Profile/`
pub fn profile_slug(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("Profile/")?;
    let slug = rest.split(['?', '#', '/']).next().unwrap_or(rest);
    if slug.is_empty() {
        None
    } else {
        Some(slug.to_string())
    }
}

/// Reviewer profile facts shown next to a review
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserInfo {
    pub contributions: Option<i64>,
    pub helpful_votes: Option<i64>,
    pub location: Option<String>,
}

/// Classifies profile info entries by their content
///
/// `"12 contributions"` and `"3 helpful votes"` are counts; any other entry
/// is taken as the reviewer's location.
pub fn classify_user_info(entries: &[String]) -> UserInfo {
    let mut info = UserInfo::default();
    for entry in entries {
        let lower = entry.to_lowercase();
        if lower.contains("contribution") {
            info.contributions = parse_count(entry);
        } else if lower.contains("helpful vote") {
            info.helpful_votes = parse_count(entry);
        } else if info.location.is_none() && !entry.trim().is_empty() {
            info.location = Some(entry.trim().to_string());
        }
    }
    info
}

/// Typed access to a [`RawRecord`]
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    record: &'a RawRecord,
}

impl<'a> FieldReader<'a> {
    pub fn new(record: &'a RawRecord) -> Self {
        Self { record }
    }

    fn raw(&self, name: &str) -> Option<&'a RawValue> {
        self.record.get(name).and_then(Option::as_ref)
    }

    /// Text value; lists are flattened with [`LIST_DELIMITER`]
    pub fn text(&self, name: &str) -> Option<String> {
        match self.raw(name)? {
            RawValue::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            RawValue::List(items) if !items.is_empty() => Some(items.join(LIST_DELIMITER)),
            _ => None,
        }
    }

    /// Every value of a field, as a list
    pub fn list(&self, name: &str) -> Vec<String> {
        match self.raw(name) {
            Some(RawValue::List(items)) => items.clone(),
            Some(RawValue::Text(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Presence flag; a matched text field also counts as present
    pub fn flag(&self, name: &str) -> bool {
        match self.raw(name) {
            Some(RawValue::Flag(b)) => *b,
            Some(RawValue::Text(_)) => true,
            Some(RawValue::List(items)) => !items.is_empty(),
            None => false,
        }
    }

    pub fn count(&self, name: &str) -> Option<i64> {
        self.text(name).as_deref().and_then(parse_count)
    }

    pub fn decimal(&self, name: &str) -> Option<f64> {
        self.text(name).as_deref().and_then(parse_decimal)
    }

    /// Text value that must be present
    pub fn require_text(&self, name: &str) -> Result<String, ExtractError> {
        self.text(name)
            .ok_or_else(|| ExtractError::MissingField(name.to_string()))
    }

    /// Integer value that must be present and parse
    pub fn require_count(&self, name: &str) -> Result<i64, ExtractError> {
        let text = self.require_text(name)?;
        parse_count(&text).ok_or(ExtractError::InvalidField {
            field: name.to_string(),
            value: text,
        })
    }
}
