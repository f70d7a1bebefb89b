//! Coercion of record values and rule values into comparable forms.
//!
//! Every parser here returns `None` on malformed input instead of failing; callers treat `None` as "no match".

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Separator for list-valued (`in`) and range (`between`) rule values.
pub const VALUE_SEPARATOR: char = '|';

/// Lowercased text form of a record value, used by the case-insensitive text operators.
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.to_lowercase()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => Some(items.iter().filter_map(text).collect::<Vec<_>>().join(", ")),
        Value::Object(_) => None,
    }
}

pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

pub fn parse_number(s: &str) -> Option<f64> { s.trim().parse::<f64>().ok().filter(|n| n.is_finite()) }

pub fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => parse_boolean(s),
        _ => None,
    }
}

pub fn parse_boolean(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "sim" | "yes" => Some(true),
        "false" | "0" | "não" | "nao" | "no" => Some(false),
        _ => None,
    }
}

/// A parsed date or timestamp. Date-only values stand for the whole UTC day starting at `instant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateValue {
    pub instant: DateTime<Utc>,
    pub date_only: bool,
}

impl DateValue {
    pub fn date(&self) -> NaiveDate { self.instant.date_naive() }

    /// First instant after this value: the next midnight for dates, the instant itself for timestamps.
    pub fn end_exclusive(&self) -> DateTime<Utc> {
        if self.date_only {
            self.instant + Duration::days(1)
        } else {
            self.instant
        }
    }
}

pub fn date(value: &Value) -> Option<DateValue> {
    match value {
        Value::String(s) => parse_date(s),
        _ => None,
    }
}

pub fn parse_date(s: &str) -> Option<DateValue> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(DateValue { instant: ts.with_timezone(&Utc), date_only: false });
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(DateValue { instant: Utc.from_utc_datetime(&naive), date_only: false });
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(DateValue { instant: Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?), date_only: true })
}

/// Splits `start|end`. Both halves must be non-blank.
pub fn split_range(value: &str) -> Option<(&str, &str)> {
    let (start, end) = value.split_once(VALUE_SEPARATOR)?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() {
        return None;
    }
    Some((start, end))
}

/// Splits a list value, dropping blank entries.
pub fn split_list(value: &str) -> Vec<&str> { value.split(VALUE_SEPARATOR).map(str::trim).filter(|s| !s.is_empty()).collect() }

/// Day count for `lastDays` / `nextDays`.
pub fn parse_days(value: &str) -> Option<i64> { value.trim().parse::<i64>().ok().filter(|n| *n >= 0 && *n <= 36_500) }

/// True for null, blank strings and empty arrays.
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}
