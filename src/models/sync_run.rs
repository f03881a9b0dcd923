use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(RunStatus::Success),
            "partial" => Some(RunStatus::Partial),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// Audit record of one orchestrated sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub id: i64,
    pub device_id: String,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub status: RunStatus,
    pub created_count: u32,
    pub skipped_count: u32,
    pub dropped_count: u32,
    pub message: String,
    pub started_at: String,
    pub finished_at: Option<String>,
}

/// Watermark of how far a device's event stream has been consumed.
#[derive(Debug, Clone, Serialize)]
pub struct SyncCursor {
    pub device_id: String,
    pub last_fetched_at: DateTime<Utc>,
}
