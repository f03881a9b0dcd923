//! Turns vendor-shaped JSON pages into canonical `RawEvent`s.

use crate::models::punch_hint::{PunchHint, VerifyMode};
use crate::models::raw_event::RawEvent;
use crate::utils::time::parse_device_timestamp;
use chrono::FixedOffset;
use serde_json::Value;
use tracing::{debug, warn};

/// Result of normalizing one page.
#[derive(Debug, Default)]
pub struct Normalized {
    /// Records found in the envelope, before any were dropped.
    pub records: usize,
    pub events: Vec<RawEvent>,
    /// Records without a usable employee code or timestamp.
    pub dropped: u32,
}

type Matcher = fn(&Value) -> Option<Vec<&Value>>;

const LIST_KEYS: &[&str] = &[
    "AcsEvent",
    "AcsEventArray",
    "Event",
    "InfoList",
    "events",
    "records",
];

/// Envelope matchers in priority order. The first non-empty match wins.
const ENVELOPES: &[(&str, Matcher)] = &[
    ("list key", list_under_known_key),
    ("data.list", data_list),
    ("bare list", bare_list),
    ("AcsEvent.InfoList", acs_event_info_list),
    ("AcsEvent object", acs_event_single),
];

const CODE_KEYS: &[&str] = &[
    "employeeNoString",
    "employeeNo",
    "employee_code",
    "cardNo",
    "cardNumber",
    "personId",
    "userId",
    "user_id",
];
const TIME_KEYS: &[&str] = &["time", "Time", "timeStr", "eventTime", "punch_time", "timestamp"];
const NAME_KEYS: &[&str] = &["name", "personName", "user_name"];

fn list_under_known_key(payload: &Value) -> Option<Vec<&Value>> {
    LIST_KEYS
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_array))
        .map(|a| a.iter().collect())
}

fn data_list(payload: &Value) -> Option<Vec<&Value>> {
    payload
        .pointer("/data/list")
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
}

fn bare_list(payload: &Value) -> Option<Vec<&Value>> {
    payload.as_array().map(|a| a.iter().collect())
}

fn acs_event_info_list(payload: &Value) -> Option<Vec<&Value>> {
    payload
        .pointer("/AcsEvent/InfoList")
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
}

fn acs_event_single(payload: &Value) -> Option<Vec<&Value>> {
    let obj = payload.get("AcsEvent").filter(|v| v.is_object())?;
    // a status-only envelope ("NO MATCH") is not an event
    TIME_KEYS
        .iter()
        .any(|k| obj.get(*k).is_some())
        .then(|| vec![obj])
}

/// Locate the record list in a payload, trying each envelope in order.
pub fn extract_records(payload: &Value) -> Vec<&Value> {
    for (name, matcher) in ENVELOPES {
        if let Some(records) = matcher(payload).filter(|r| !r.is_empty()) {
            debug!(envelope = *name, count = records.len(), "envelope matched");
            return records;
        }
    }
    Vec::new()
}

fn text_field(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match record.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn int_field(record: &Value, key: &str) -> Option<i64> {
    match record.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Direction hint plus the raw value it came from.
fn punch_hint(record: &Value) -> (PunchHint, Option<String>) {
    if let Some(status) = record.get("attendanceStatus").and_then(Value::as_str) {
        let hint = PunchHint::from_attendance_status(status);
        if hint != PunchHint::Unknown {
            return (hint, Some(status.to_string()));
        }
    }

    if let Some(code) = int_field(record, "punch") {
        let hint = PunchHint::from_zk_punch(code);
        if hint != PunchHint::Unknown {
            return (hint, Some(code.to_string()));
        }
    }

    if let Some(raw) = text_field(record, &["punch_type", "punchType"]) {
        let hint = PunchHint::from_punch_type(&raw);
        return (hint, Some(raw));
    }

    (PunchHint::Unknown, None)
}

fn verify_mode(record: &Value) -> (VerifyMode, Option<String>) {
    if let Some(minor) = int_field(record, "minor") {
        return (VerifyMode::from_isapi_minor(minor), Some(format!("minor:{minor}")));
    }
    if let Some(status) = record.get("status").and_then(Value::as_i64) {
        return (VerifyMode::from_zk_status(status), None);
    }
    (VerifyMode::Other, None)
}

fn normalize_record(record: &Value, local: &FixedOffset) -> Option<RawEvent> {
    let Some(code) = text_field(record, CODE_KEYS) else {
        debug!("record without employee code dropped");
        return None;
    };

    let raw_time = text_field(record, TIME_KEYS);
    let Some(timestamp) = raw_time
        .as_deref()
        .and_then(|t| parse_device_timestamp(t, local))
    else {
        warn!(
            code = %code,
            time = raw_time.as_deref().unwrap_or("<missing>"),
            "record with unparseable timestamp dropped"
        );
        return None;
    };

    let (hint, raw_hint) = punch_hint(record);
    let (mode, raw_minor) = verify_mode(record);

    Some(RawEvent {
        device_employee_code: code,
        timestamp,
        punch_hint: hint,
        display_name: text_field(record, NAME_KEYS),
        raw_punch_type: raw_hint.or(raw_minor),
        verify_mode: mode,
    })
}

/// Normalize one page. Naive timestamps are read in `local`.
pub fn normalize(payload: &Value, local: &FixedOffset) -> Normalized {
    let records = extract_records(payload);
    let mut out = Normalized {
        records: records.len(),
        ..Default::default()
    };

    for record in records {
        match normalize_record(record, local) {
            Some(ev) => out.events.push(ev),
            None => out.dropped += 1,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::from_db;
    use serde_json::json;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn three_envelopes_yield_the_same_event() {
        let rec = json!({"employeeNoString": "42", "time": "2024-05-01T08:00:00+02:00"});
        let payloads = [
            json!({"AcsEvent": [rec.clone()]}),
            json!({"data": {"list": [rec.clone()]}}),
            json!([rec.clone()]),
        ];

        for p in payloads {
            let n = normalize(&p, &utc());
            assert_eq!(n.records, 1);
            assert_eq!(n.dropped, 0);
            assert_eq!(n.events[0].device_employee_code, "42");
            assert_eq!(n.events[0].timestamp, from_db("2024-05-01T06:00:00Z").unwrap());
        }
    }

    #[test]
    fn isapi_info_list_envelope_and_minor_code() {
        let p = json!({
            "AcsEvent": {
                "searchID": "punchsync-1",
                "responseStatusStrg": "OK",
                "InfoList": [
                    {"employeeNoString": "7", "time": "2024-05-01T09:00:00+08:00",
                     "minor": 75, "name": "Ada", "attendanceStatus": "checkIn"}
                ]
            }
        });
        let n = normalize(&p, &utc());
        let ev = &n.events[0];
        assert_eq!(ev.display_name.as_deref(), Some("Ada"));
        assert_eq!(ev.verify_mode, VerifyMode::Face);
        assert_eq!(ev.punch_hint, PunchHint::In);
        assert_eq!(ev.raw_punch_type.as_deref(), Some("checkIn"));
    }

    #[test]
    fn status_only_envelope_has_no_records() {
        let p = json!({"AcsEvent": {"searchID": "x", "responseStatusStrg": "NO MATCH", "numOfMatches": 0}});
        let n = normalize(&p, &utc());
        assert_eq!(n.records, 0);
        assert!(n.events.is_empty());
    }

    #[test]
    fn bad_timestamp_and_missing_code_are_dropped() {
        let p = json!([
            {"employeeNo": 5, "time": "not-a-date"},
            {"time": "2024-05-01T08:00:00Z"},
            {"employeeNo": 5, "eventTime": "2024-05-01 08:00:00"},
        ]);
        let n = normalize(&p, &utc());
        assert_eq!(n.records, 3);
        assert_eq!(n.dropped, 2);
        assert_eq!(n.events.len(), 1);
        assert_eq!(n.events[0].device_employee_code, "5");
    }

    #[test]
    fn code_aliases_follow_priority_and_skip_blanks() {
        let p = json!([{ "employeeNoString": "  ", "cardNo": "C-9", "personId": "p1",
                         "time": "2024-05-01T08:00:00Z" }]);
        let n = normalize(&p, &utc());
        assert_eq!(n.events[0].device_employee_code, "C-9");
    }

    #[test]
    fn naive_times_use_the_device_offset() {
        let plus3 = FixedOffset::east_opt(3 * 3600).unwrap();
        let p = json!([{ "user_id": "1", "timestamp": "2024-05-01T09:00:00", "punch": 1, "status": 1 }]);
        let n = normalize(&p, &plus3);
        let ev = &n.events[0];
        assert_eq!(ev.timestamp, from_db("2024-05-01T06:00:00Z").unwrap());
        assert_eq!(ev.punch_hint, PunchHint::Out);
        assert_eq!(ev.verify_mode, VerifyMode::Fingerprint);
    }

    #[test]
    fn punch_type_strings() {
        let p = json!([{ "userId": "u", "punch_time": "2024-05-01T09:00:00Z", "punchType": "OUT" }]);
        assert_eq!(normalize(&p, &utc()).events[0].punch_hint, PunchHint::Out);
    }
}
