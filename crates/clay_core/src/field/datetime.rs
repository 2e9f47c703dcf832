//! Timestamp parsing and formatting.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

/// `Date#toString()` layout written by JavaScript runtimes, minus the
/// trailing ` (Zone Name)`.
const JS_FORMAT: &str = "%a %b %d %Y %H:%M:%S GMT%z";

/// Naive layouts accepted after RFC 3339 and RFC 2822 fail, all read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%B %d, %Y %H:%M:%S",
];

/// Date-only layouts, read as midnight UTC.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%B %d %Y", "%a %b %d %Y"];

/// Parses a `yyyy-mm-dd`-prefixed, RFC 2822, JavaScript `Date#toString()`
/// or long-form (`February 25, 1988`) string into a UTC timestamp.
pub(crate) fn parse(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return truncate(at.with_timezone(&Utc));
    }
    if let Ok(at) = DateTime::parse_from_rfc2822(text) {
        return truncate(at.with_timezone(&Utc));
    }
    if let Ok(at) = DateTime::parse_from_str(strip_zone_name(text), JS_FORMAT) {
        return truncate(at.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return truncate(Utc.from_utc_datetime(&naive));
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// "Thu Feb 25 1988 00:00:00 GMT+0000 (UTC)" -> "Thu Feb 25 1988 00:00:00 GMT+0000"
fn strip_zone_name(text: &str) -> &str {
    match text.rfind(" (") {
        Some(start) if text.ends_with(')') => &text[..start],
        _ => text,
    }
}

/// Converts Unix milliseconds into a UTC timestamp.
pub(crate) fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single().and_then(truncate)
}

/// Current Unix time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Stored text form of a timestamp.
pub(crate) fn format(at: &DateTime<Utc>) -> String {
    at.to_rfc2822()
}

// Stored text is RFC 2822, which has no sub-second part.
fn truncate(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    at.with_nanosecond(0)
}
