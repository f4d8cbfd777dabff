//! Field normalization for upstream values.
//!
//! Upstream sends empty strings where a value is unknown; all of these become
//! absent. Unparseable dates and times are treated the same way.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};

/// Trimmed text, or `None` when blank.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

/// `YYYY-MM-DD` date.
pub fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    let value = non_blank(value)?;
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").ok()
}

/// `HH:MM` or `HH:MM:SS` local time.
pub fn parse_time(value: Option<&str>) -> Option<NaiveTime> {
    let value = non_blank(value)?;
    NaiveTime::parse_from_str(&value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&value, "%H:%M:%S"))
        .ok()
}

/// RFC 3339 instant, offset preserved.
pub fn parse_timestamp(value: Option<&str>) -> Option<DateTime<FixedOffset>> {
    let value = non_blank(value)?;
    DateTime::parse_from_rfc3339(&value).ok()
}

/// Comma-joined weekday list; `None` for no days.
pub fn join_days(days: &[String]) -> Option<String> {
    let days: Vec<&str> = days
        .iter()
        .map(|day| day.trim())
        .filter(|day| !day.is_empty())
        .collect();
    (!days.is_empty()).then(|| days.join(","))
}
