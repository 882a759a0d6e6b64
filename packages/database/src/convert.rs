//! Conversions between model values and `DuckDB` column text.
//!
//! Timestamps and dates are bound as text and cast in SQL, then read back
//! with `::TEXT`.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::DbError;

/// Formats a UTC timestamp for binding into a `TIMESTAMP` column.
#[must_use]
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Parses a `DuckDB` timestamp text representation into a UTC `DateTime`.
///
/// `DuckDB`'s `::TEXT` cast can produce several formats depending on the
/// stored precision:
/// - `2024-01-15 10:30:00` (no fractional seconds)
/// - `2024-01-15 10:30:00.123` (fractional seconds)
/// - `2024-01-15 10:30:00+00` (with timezone)
/// - `2024-01-15 10:30:00.123+00` (both)
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }

    // No offset: stored as UTC
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    log::warn!("Failed to parse timestamp: {s:?}");
    None
}

/// Like [`parse_timestamp`], but a failure is a [`DbError::Conversion`].
///
/// # Errors
///
/// Returns [`DbError::Conversion`] if `s` is not a timestamp.
pub fn require_timestamp(s: &str) -> Result<DateTime<Utc>, DbError> {
    parse_timestamp(s).ok_or_else(|| DbError::Conversion {
        message: format!("invalid timestamp {s:?}"),
    })
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses a `DATE::TEXT` value.
///
/// # Errors
///
/// Returns [`DbError::Conversion`] if `s` is not a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| DbError::Conversion {
        message: format!("invalid date {s:?}: {e}"),
    })
}

/// Parses a text column into a strum enum.
///
/// # Errors
///
/// Returns [`DbError::Conversion`] naming `column` if the value is not a
/// known variant.
pub fn parse_enum<T: FromStr>(column: &str, value: &str) -> Result<T, DbError> {
    value.parse().map_err(|_| DbError::Conversion {
        message: format!("unknown {column} value {value:?}"),
    })
}

/// Converts a `BIGINT` count column.
///
/// # Errors
///
/// Returns [`DbError::Conversion`] if the value does not fit.
pub fn to_u32(column: &str, value: i64) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|_| DbError::Conversion {
        message: format!("{column} out of range: {value}"),
    })
}

/// Converts a `BIGINT` count column.
///
/// # Errors
///
/// Returns [`DbError::Conversion`] if the value is negative.
pub fn to_u64(column: &str, value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_| DbError::Conversion {
        message: format!("{column} out of range: {value}"),
    })
}

/// Converts a count for binding into a `BIGINT` column.
#[must_use]
pub fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
