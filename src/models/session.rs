use chrono::{DateTime, Utc};
use serde::Serialize;

/// One check-in/check-out pair in the attendance ledger.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttendanceSession {
    pub id: i64,
    pub employee_id: i64,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub source_device: String,
}

impl AttendanceSession {
    pub fn is_open(&self) -> bool {
        self.check_out.is_none()
    }

    pub fn worked_minutes(&self) -> Option<i64> {
        self.check_out.map(|out| (out - self.check_in).num_minutes())
    }
}

/// Which open session a closing event targets when several are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseOrder {
    #[default]
    Latest,
    Earliest,
}
