// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Loose numeric and date coercion for dashboard values
//!
//! Feedback and span payloads arrive as loosely typed JSON, so numbers may
//! show up as strings ("4", "0.75 points") and dates in a handful of
//! formats. Everything here returns `Option` and never panics.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn leading_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?")
            .expect("leading number pattern is valid")
    })
}

fn date_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}|^\d{4}/\d{2}/\d{2}|^\w{3}\s\w{3}\s\d{2}")
            .expect("date prefix pattern is valid")
    })
}

/// Parse the leading numeric prefix of `s` (`"12.5abc"` -> 12.5).
pub fn lenient_number(s: &str) -> Option<f64> {
    let m = leading_number_re().find(s)?;
    m.as_str().trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// True when the whole trimmed string is a finite number
pub fn is_strict_number(s: &str) -> bool {
    let trimmed = s.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().map(|v| v.is_finite()).unwrap_or(false)
}

/// Numeric view of a feedback value: numbers pass through, numeric
/// strings are parsed, booleans map to 1/0. Anything else is `None`.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => lenient_number(s),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Date-looking prefix: `YYYY-MM-DD`, `YYYY/MM/DD` or `Www Mmm DD`
pub fn looks_like_date(s: &str) -> bool {
    date_prefix_re().is_match(s)
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%a %b %d %Y %H:%M:%S",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%a %b %d %Y"];

/// Parse a timestamp in any of the formats the backend and browsers
/// produce. Naive timestamps are taken as UTC.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // "Tue Mar 05 2024 10:00:00 GMT+0000 (Coordinated Universal Time)"
    let s = s.split(" GMT").next().unwrap_or(s);

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Epoch milliseconds for strings that pass the date heuristic
pub fn parse_date_millis(s: &str) -> Option<f64> {
    if !looks_like_date(s) {
        return None;
    }
    parse_date(s).map(|dt| dt.timestamp_millis() as f64)
}

/// ISO-8601 rendering (millisecond precision, `Z` suffix) of epoch millis
pub fn millis_to_iso(millis: f64) -> Option<String> {
    if !millis.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(millis.trunc() as i64)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_number() {
        assert_eq!(lenient_number("6"), Some(6.0));
        assert_eq!(lenient_number(" -2.5e1 units"), Some(-25.0));
        assert_eq!(lenient_number(".5"), Some(0.5));
        assert_eq!(lenient_number("12abc"), Some(12.0));
        assert_eq!(lenient_number("abc"), None);
        assert_eq!(lenient_number(""), None);
    }

    #[test]
    fn test_strict_number() {
        assert!(is_strict_number("3.14"));
        assert!(is_strict_number(" 7 "));
        assert!(!is_strict_number("7 apples"));
        assert!(!is_strict_number(""));
        assert!(!is_strict_number("NaN"));
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(&json!(2)), Some(2.0));
        assert_eq!(coerce_number(&json!("4")), Some(4.0));
        assert_eq!(coerce_number(&json!(true)), Some(1.0));
        assert_eq!(coerce_number(&json!(false)), Some(0.0));
        assert_eq!(coerce_number(&json!("great")), None);
        assert_eq!(coerce_number(&json!(null)), None);
        assert_eq!(coerce_number(&json!([1])), None);
    }

    #[test]
    fn test_date_heuristic() {
        assert!(looks_like_date("2024-03-05T10:00:00Z"));
        assert!(looks_like_date("2024/03/05"));
        assert!(looks_like_date("Tue Mar 05 2024 10:00:00 GMT+0000"));
        assert!(!looks_like_date("42"));
        assert!(!looks_like_date("March 5"));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        assert_eq!(parse_date("2024-03-05T10:00:00Z"), Some(expected));
        assert_eq!(parse_date("2024-03-05T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_date("2024-03-05T10:00:00.000000"), Some(expected));
        assert_eq!(parse_date("2024-03-05 10:00:00"), Some(expected));
        assert_eq!(
            parse_date("Tue Mar 05 2024 10:00:00 GMT+0000 (Coordinated Universal Time)"),
            Some(expected)
        );
        assert_eq!(
            parse_date("2024/03/05"),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date("2024-13-45"), None);
    }

    #[test]
    fn test_parse_date_millis_requires_heuristic() {
        assert_eq!(parse_date_millis("1709632800000"), None);
        assert_eq!(
            parse_date_millis("2024-03-05T10:00:00Z"),
            Some(1_709_632_800_000.0)
        );
    }

    #[test]
    fn test_millis_to_iso() {
        assert_eq!(
            millis_to_iso(1_709_632_800_000.0).as_deref(),
            Some("2024-03-05T10:00:00.000Z")
        );
        assert_eq!(millis_to_iso(f64::NAN), None);
    }
}
