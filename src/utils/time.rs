//! Time utilities: parsing device timestamps, UTC offsets, DB encoding, formatting minutes.

use crate::errors::{AppError, AppResult};
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, SubsecRound, TimeZone, Utc};

const FALLBACK_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const FALLBACK_FORMAT_SPACE: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a device timestamp into UTC, cut to whole seconds.
///
/// Accepts RFC 3339 (`Z` or `±HH:MM`), then falls back to the first 19
/// characters as `YYYY-MM-DDTHH:MM:SS` (or with a space separator).
/// Naive values are read in `local`.
pub fn parse_device_timestamp(raw: &str, local: &FixedOffset) -> Option<DateTime<Utc>> {
    parse_instant(raw, local).map(|dt| dt.trunc_subsecs(0))
}

fn parse_instant(raw: &str, local: &FixedOffset) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // ISAPI firmwares sometimes emit "+0800" without the colon
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }

    let head: String = s.chars().take(19).collect();
    let naive = NaiveDateTime::parse_from_str(&head, FALLBACK_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(&head, FALLBACK_FORMAT_SPACE))
        .ok()?;

    local
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a user supplied range bound (CLI). Naive values are UTC.
pub fn parse_range_bound(raw: &str) -> AppResult<DateTime<Utc>> {
    let utc = FixedOffset::east_opt(0).ok_or_else(|| AppError::Other("UTC offset".into()))?;
    if let Some(dt) = parse_device_timestamp(raw, &utc) {
        return Ok(dt);
    }
    // bare date → midnight
    chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| Utc.from_utc_datetime(&n))
        .ok_or_else(|| AppError::InvalidDateTime(raw.to_string()))
}

/// Parse a configured offset: "UTC", "Z", "+03:00", "-0530".
pub fn parse_utc_offset(raw: &str) -> AppResult<FixedOffset> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("utc") || s == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(|| AppError::Other("UTC offset".into()));
    }

    let (sign, rest) = match s.as_bytes()[0] {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return Err(AppError::Configuration(format!("invalid timezone offset '{raw}'"))),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Configuration(format!("invalid timezone offset '{raw}'")));
    }

    let hours: i32 = digits[..2].parse().unwrap_or(0);
    let minutes: i32 = digits[2..].parse().unwrap_or(0);

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| AppError::Configuration(format!("timezone offset out of range '{raw}'")))
}

/// Encoding used for every instant stored in SQLite. Second precision with a
/// trailing `Z`, so equality in SQL is equality of instants.
pub fn to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn from_db(s: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::InvalidDateTime(s.to_string()))
}

/// Format used in request bodies sent to devices.
pub fn to_device(ts: &DateTime<Utc>, local: &FixedOffset) -> String {
    ts.with_timezone(local)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}

pub fn format_minutes(mins: i64) -> String {
    let sign = if mins < 0 { "-" } else { "" };
    let m = mins.abs();
    format!("{}{:02}:{:02}", sign, m / 60, m % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn parses_zulu_offset_and_naive_forms_to_the_same_instant() {
        let a = parse_device_timestamp("2024-03-01T08:00:00Z", &utc()).unwrap();
        let b = parse_device_timestamp("2024-03-01T11:00:00+03:00", &utc()).unwrap();
        let c = parse_device_timestamp("2024-03-01T08:00:00", &utc()).unwrap();
        let d = parse_device_timestamp("2024-03-01T11:00:00+0300", &utc()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
    }

    #[test]
    fn naive_timestamps_use_the_device_offset() {
        let plus3 = parse_utc_offset("+03:00").unwrap();
        let ts = parse_device_timestamp("2024-03-01 11:00:00", &plus3).unwrap();
        assert_eq!(to_db(&ts), "2024-03-01T08:00:00Z");
    }

    #[test]
    fn fractional_seconds_are_dropped() {
        let ts = parse_device_timestamp("2024-03-01T08:00:00.750Z", &utc()).unwrap();
        assert_eq!(to_db(&ts), "2024-03-01T08:00:00Z");
        assert_eq!(ts, from_db("2024-03-01T08:00:00Z").unwrap());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_device_timestamp("not-a-date", &utc()).is_none());
        assert!(parse_device_timestamp("", &utc()).is_none());
    }

    #[test]
    fn offsets_parse() {
        assert_eq!(parse_utc_offset("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("-0530").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert!(parse_utc_offset("Europe/Rome").is_err());
    }

    #[test]
    fn db_encoding_is_stable() {
        let ts = parse_range_bound("2024-03-01").unwrap();
        assert_eq!(to_db(&ts), "2024-03-01T00:00:00Z");
        assert_eq!(from_db(&to_db(&ts)).unwrap(), ts);
    }
}
