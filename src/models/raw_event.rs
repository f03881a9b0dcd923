use chrono::{DateTime, Utc};
use serde::Serialize;

use super::punch_hint::{PunchHint, VerifyMode};

/// Canonical punch produced by the normalizer. Never persisted as-is.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RawEvent {
    pub device_employee_code: String,
    pub timestamp: DateTime<Utc>,
    pub punch_hint: PunchHint,
    pub display_name: Option<String>,
    pub raw_punch_type: Option<String>,
    pub verify_mode: VerifyMode,
}

impl RawEvent {
    pub fn new(code: impl Into<String>, timestamp: DateTime<Utc>, punch_hint: PunchHint) -> Self {
        Self {
            device_employee_code: code.into(),
            timestamp,
            punch_hint,
            display_name: None,
            raw_punch_type: None,
            verify_mode: VerifyMode::Other,
        }
    }
}
