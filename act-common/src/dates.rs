//! Calendar-date normalization
//!
//! Every session date is reduced to a plain ISO calendar date before it takes
//! part in identity comparison or ordering. Sources hand us timestamps, bare
//! dates and ISO strings with or without a time component; all of them must
//! compare equal when they fall on the same calendar day.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATE_FORMAT: &str = "%Y-%m-%d";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A date in any of the representations the ingest boundary accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateValue {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(String),
}

impl DateValue {
    /// Reduce to a calendar date
    pub fn normalize(&self) -> Result<NaiveDate> {
        match self {
            DateValue::Date(date) => Ok(*date),
            DateValue::DateTime(datetime) => Ok(datetime.date()),
            DateValue::Text(raw) => normalize_date(raw),
        }
    }
}

impl From<NaiveDate> for DateValue {
    fn from(date: NaiveDate) -> Self {
        DateValue::Date(date)
    }
}

impl From<NaiveDateTime> for DateValue {
    fn from(datetime: NaiveDateTime) -> Self {
        DateValue::DateTime(datetime)
    }
}

impl From<&str> for DateValue {
    fn from(raw: &str) -> Self {
        DateValue::Text(raw.to_string())
    }
}

impl From<String> for DateValue {
    fn from(raw: String) -> Self {
        DateValue::Text(raw)
    }
}

/// Parse an ISO-ish date string and keep only its calendar date
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS[.fff]]` (space separator
/// allowed) and RFC 3339 values with `Z` or a numeric offset. The calendar
/// date of the written wall-clock value is kept; no timezone conversion is
/// applied.
pub fn normalize_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidDate(raw.to_string()));
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Ok(date);
    }

    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(datetime.date());
        }
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(datetime.date_naive());
    }

    Err(Error::InvalidDate(raw.to_string()))
}

/// Format a calendar date the way the manifest stores it
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Serde adapter: write `YYYY-MM-DD`, read anything [`normalize_date`] accepts
pub mod iso_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_date(*date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::normalize_date(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_plain_date() {
        assert_eq!(normalize_date("2025-01-01").unwrap(), ymd(2025, 1, 1));
        assert_eq!(normalize_date("  2025-03-02 ").unwrap(), ymd(2025, 3, 2));
    }

    #[test]
    fn test_time_component_is_dropped() {
        assert_eq!(normalize_date("2025-01-01T08:00:00").unwrap(), ymd(2025, 1, 1));
        assert_eq!(normalize_date("2025-01-01 23:59:59").unwrap(), ymd(2025, 1, 1));
        assert_eq!(normalize_date("2025-01-01T12:30:00.250").unwrap(), ymd(2025, 1, 1));
        assert_eq!(normalize_date("2025-01-01T12:30").unwrap(), ymd(2025, 1, 1));
    }

    #[test]
    fn test_zulu_and_offsets_keep_wall_clock_date() {
        assert_eq!(normalize_date("2025-01-01T23:30:00Z").unwrap(), ymd(2025, 1, 1));
        assert_eq!(
            normalize_date("2025-01-01T23:30:00-06:00").unwrap(),
            ymd(2025, 1, 1)
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(normalize_date("").is_err());
        assert!(normalize_date("yesterday").is_err());
        assert!(normalize_date("2025-13-01").is_err());
    }

    #[test]
    fn test_date_value_variants_agree() {
        let dt = ymd(2025, 1, 2).and_hms_opt(12, 30, 0).unwrap();
        assert_eq!(DateValue::from(dt).normalize().unwrap(), ymd(2025, 1, 2));
        assert_eq!(DateValue::from(ymd(2025, 1, 2)).normalize().unwrap(), ymd(2025, 1, 2));
        assert_eq!(
            DateValue::from("2025-01-02T00:00:00").normalize().unwrap(),
            ymd(2025, 1, 2)
        );
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(ymd(2024, 8, 5)), "2024-08-05");
    }
}
