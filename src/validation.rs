//! Validation primitives shared by every operation handler (spec §4.B).

use chrono::{NaiveDate, TimeZone, Utc};

use crate::error::{Error, Result};

pub fn non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must be non-empty"));
    }
    Ok(())
}

pub fn finite_integer(field: &str, value: i64) -> Result<i64> {
    // i64 is always finite; this exists as the named predicate the spec calls for,
    // kept as the single seam where a future non-integer numeric type would be checked.
    let _ = field;
    Ok(value)
}

pub fn positive_integer(field: &str, value: i64) -> Result<i64> {
    if value <= 0 {
        return Err(Error::validation(field, "must be a positive integer"));
    }
    Ok(value)
}

pub fn non_negative_integer(field: &str, value: i64) -> Result<i64> {
    if value < 0 {
        return Err(Error::validation(field, "must be a non-negative integer"));
    }
    Ok(value)
}

pub fn optional_positive_integer(field: &str, value: Option<i64>) -> Result<Option<i64>> {
    value.map(|v| positive_integer(field, v)).transpose()
}

pub fn optional_non_negative_integer(field: &str, value: Option<i64>) -> Result<Option<i64>> {
    value.map(|v| non_negative_integer(field, v)).transpose()
}

/// Parse `YYYY-MM-DD` into a local-midnight epoch-ms timestamp (spec §4.B).
/// "Local" here is UTC — the kernel has no timezone configuration surface.
pub fn parse_iso_day(field: &str, value: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| Error::validation(field, "must be an ISO date YYYY-MM-DD"))?;
    let midnight = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    Ok(Utc.from_utc_datetime(&midnight).timestamp_millis())
}

pub fn priority_in_range(value: i32) -> Result<i32> {
    if !(0..=5).contains(&value) {
        return Err(Error::validation("priority", "must be between 0 and 5"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_rejects_blank_strings() {
        assert!(non_empty("title", "   ").is_err());
        assert!(non_empty("title", "ok").is_ok());
    }

    #[test]
    fn positive_integer_rejects_zero_and_negative() {
        assert!(positive_integer("duration_minutes", 0).is_err());
        assert!(positive_integer("duration_minutes", -5).is_err());
        assert!(positive_integer("duration_minutes", 1).is_ok());
    }

    #[test]
    fn parse_iso_day_round_trips_known_date() {
        let ms = parse_iso_day("due_at", "1970-01-02").unwrap();
        assert_eq!(ms, 86_400_000);
    }

    #[test]
    fn parse_iso_day_rejects_malformed_input() {
        assert!(parse_iso_day("due_at", "not-a-date").is_err());
    }

    #[test]
    fn priority_range_is_zero_to_five_inclusive() {
        assert!(priority_in_range(0).is_ok());
        assert!(priority_in_range(5).is_ok());
        assert!(priority_in_range(6).is_err());
    }
}
