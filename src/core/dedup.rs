use crate::db::queries::device_event_exists;
use crate::errors::AppResult;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// True when no ledger record exists yet for `(employee_id, at)`.
///
/// Meant to run inside the event transaction; the unique index on
/// `device_events(employee_id, punched_at)` rejects anything that slips past.
pub fn accept(conn: &Connection, employee_id: i64, at: &DateTime<Utc>) -> AppResult<bool> {
    Ok(!device_event_exists(conn, employee_id, at)?)
}
