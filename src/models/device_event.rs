use chrono::{DateTime, Utc};
use serde::Serialize;

use super::punch_hint::{PunchHint, VerifyMode};

/// Raw ledger row kept for deduplication and audit.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceEventRecord {
    pub id: i64,
    pub employee_id: i64,
    pub employee_device_code: String,
    pub timestamp: DateTime<Utc>,
    pub source_device_id: String,
    pub raw_punch_type: Option<String>,
    pub punch_hint: PunchHint,
    pub verify_mode: VerifyMode,
}
