//! Field parsing helpers shared by the feeds.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Parses a feed timestamp.
///
/// Accepts Socrata's ISO 8601 form with or without fractional seconds,
/// a space-separated form, and bare dates (taken as midnight).
#[must_use]
pub fn parse_socrata_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

/// Parses a coordinate component. Accepts a comma as decimal separator.
#[must_use]
pub fn parse_coordinate(s: &str) -> Option<f64> {
    let s = s.trim();
    s.parse::<f64>()
        .ok()
        .or_else(|| s.replace(',', ".").parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Renders a JSON scalar as text. Returns `None` for null, empty strings,
/// arrays, and objects.
#[must_use]
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Reads a JSON scalar as a number, parsing strings when needed.
#[must_use]
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_coordinate(s),
        _ => None,
    }
}

/// Reads a JSON scalar as a non-negative count. Fractions are truncated.
#[must_use]
pub fn value_to_u32(value: &Value) -> Option<u32> {
    let v = value_to_f64(value)?;
    if v < 0.0 || v > f64::from(u32::MAX) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(v as u32)
}

/// Reads a JSON scalar as a flag: booleans, `1`/`0`, and yes/no words in
/// English or Spanish.
#[must_use]
pub fn value_to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "si" | "sí" | "1" | "publico" | "público" => Some(true),
            "false" | "no" | "0" | "privado" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_socrata_date_with_fractional() {
        let dt = parse_socrata_date("2024-01-15T14:30:00.000").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
    }

    #[test]
    fn parses_socrata_date_without_fractional() {
        let dt = parse_socrata_date("2024-01-15T14:30:00").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
    }

    #[test]
    fn parses_bare_dates_as_midnight() {
        let dt = parse_socrata_date("15/01/2024").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 00:00:00 UTC");
        assert!(parse_socrata_date("2024-01-15").is_some());
    }

    #[test]
    fn rejects_invalid_date() {
        assert!(parse_socrata_date("not-a-date").is_none());
        assert!(parse_socrata_date("").is_none());
    }

    #[test]
    fn parses_coordinates_with_comma_decimal() {
        assert!((parse_coordinate("4,6097").unwrap() - 4.6097).abs() < f64::EPSILON);
        assert!((parse_coordinate(" -74.08 ").unwrap() - -74.08).abs() < f64::EPSILON);
        assert!(parse_coordinate("north").is_none());
        assert!(parse_coordinate("NaN").is_none());
    }

    #[test]
    fn reads_json_scalars() {
        assert_eq!(value_to_string(&json!(" BOSA ")), Some("BOSA".to_string()));
        assert_eq!(value_to_string(&json!(7)), Some("7".to_string()));
        assert_eq!(value_to_string(&json!("")), None);
        assert_eq!(value_to_u32(&json!("3")), Some(3));
        assert_eq!(value_to_u32(&json!(-1)), None);
        assert_eq!(value_to_bool(&json!("Sí")), Some(true));
        assert_eq!(value_to_bool(&json!(0)), Some(false));
    }
}
