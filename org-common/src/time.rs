//! Valid-time helpers
//!
//! All effective-dated data in the org schema is date-only: a slice covers
//! `[effective_date, end_date]` whole days. `OPEN_END` is the sentinel for
//! "no known end".

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::error::{Error, Result};

/// Sentinel end date for open-ended slices
pub const OPEN_END: NaiveDate = match NaiveDate::from_ymd_opt(9999, 12, 31) {
    Some(d) => d,
    None => unreachable!(),
};

/// Parse a user-supplied instant as a valid-time date.
///
/// Accepts `YYYY-MM-DD` or RFC 3339 (the timestamp is normalized to its UTC
/// calendar date).
pub fn parse_when(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation("missing time value"));
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc).date_naive());
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(d);
    }
    Err(Error::validation(format!("invalid time: {value}")))
}

/// Parse a user-supplied transaction-time instant (RFC 3339 or date-only,
/// the latter meaning midnight UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation("missing time value"));
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(d.and_time(NaiveTime::MIN).and_utc());
    }
    Err(Error::validation(format!("invalid time: {value}")))
}

/// The day before `date`, used to close a slice against its successor
pub fn day_before(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(date)
}

/// `true` when the inclusive window `[effective, end]` covers `at`
pub fn covers(effective: NaiveDate, end: NaiveDate, at: NaiveDate) -> bool {
    effective <= at && at <= end
}

/// Compact `YYYYMMDD` token for output file names
pub fn file_token(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_when_accepts_date_only() {
        assert_eq!(
            parse_when("2025-01-01").unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
    }

    #[test]
    fn parse_when_normalizes_rfc3339_to_utc_date() {
        // 23:30 UTC-2 is 01:30 UTC the next day
        assert_eq!(
            parse_when("2025-03-01T23:30:00-02:00").unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()
        );
    }

    #[test]
    fn parse_when_rejects_garbage() {
        assert!(parse_when("").is_err());
        assert!(parse_when("yesterday").is_err());
        assert!(parse_when("2025-13-01").is_err());
    }

    #[test]
    fn open_end_is_last_representable_day() {
        assert_eq!(OPEN_END, NaiveDate::from_ymd_opt(9999, 12, 31).unwrap());
    }

    #[test]
    fn covers_is_inclusive_on_both_ends() {
        let eff = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert!(covers(eff, end, eff));
        assert!(covers(eff, end, end));
        assert!(!covers(eff, end, day_before(eff)));
        assert!(!covers(eff, end, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()));
    }
}
