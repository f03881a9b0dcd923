//! Sync bookkeeping: cursors, run records and run leases.

use crate::errors::{AppError, AppResult};
use crate::models::sync_run::{RunStatus, SyncCursor, SyncRun};
use crate::utils::time::{from_db, to_db};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

pub fn load_cursor(conn: &Connection, device_id: &str) -> AppResult<Option<SyncCursor>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT last_fetched_at FROM sync_cursors WHERE device_id = ?1",
            [device_id],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(s) => Ok(Some(SyncCursor {
            device_id: device_id.to_string(),
            last_fetched_at: from_db(&s)?,
        })),
        None => Ok(None),
    }
}

pub fn save_cursor(conn: &Connection, device_id: &str, at: &DateTime<Utc>) -> AppResult<()> {
    conn.execute(
        "INSERT INTO sync_cursors (device_id, last_fetched_at, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(device_id) DO UPDATE SET
             last_fetched_at = excluded.last_fetched_at,
             updated_at = excluded.updated_at",
        params![device_id, to_db(at), to_db(&Utc::now())],
    )?;
    Ok(())
}

pub fn reset_cursor(conn: &Connection, device_id: &str) -> AppResult<bool> {
    let n = conn.execute("DELETE FROM sync_cursors WHERE device_id = ?1", [device_id])?;
    Ok(n > 0)
}

// ------------------------------------------------------------
// Runs
// ------------------------------------------------------------

/// Create the run record at the start of a run; finalized by `finish_run`.
pub fn begin_run(
    conn: &Connection,
    device_id: &str,
    range_start: &DateTime<Utc>,
    range_end: &DateTime<Utc>,
) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO sync_runs (device_id, range_start, range_end, status, message, started_at)
         VALUES (?1, ?2, ?3, 'success', '', ?4)",
        params![device_id, to_db(range_start), to_db(range_end), to_db(&Utc::now())],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_run(conn: &Connection, run: &SyncRun) -> AppResult<()> {
    conn.execute(
        "UPDATE sync_runs
         SET status = ?1, created_count = ?2, skipped_count = ?3,
             dropped_count = ?4, message = ?5, finished_at = ?6
         WHERE id = ?7",
        params![
            run.status.to_db_str(),
            run.created_count,
            run.skipped_count,
            run.dropped_count,
            run.message,
            run.finished_at,
            run.id,
        ],
    )?;
    Ok(())
}

fn map_run(row: &Row) -> Result<SyncRun> {
    let conv = |e: AppError| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    };
    let status: String = row.get("status")?;
    let start: String = row.get("range_start")?;
    let end: String = row.get("range_end")?;

    Ok(SyncRun {
        id: row.get("id")?,
        device_id: row.get("device_id")?,
        range_start: from_db(&start).map_err(conv)?,
        range_end: from_db(&end).map_err(conv)?,
        status: RunStatus::from_db_str(&status)
            .ok_or_else(|| conv(AppError::Parse(format!("Invalid run status: {status}"))))?,
        created_count: row.get("created_count")?,
        skipped_count: row.get("skipped_count")?,
        dropped_count: row.get("dropped_count")?,
        message: row.get("message")?,
        started_at: row.get("started_at")?,
        finished_at: row.get("finished_at")?,
    })
}

pub fn load_run(conn: &Connection, id: i64) -> AppResult<Option<SyncRun>> {
    Ok(conn
        .query_row("SELECT * FROM sync_runs WHERE id = ?1", [id], map_run)
        .optional()?)
}

pub fn load_runs(conn: &Connection, device_id: Option<&str>, limit: u32) -> AppResult<Vec<SyncRun>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM sync_runs
         WHERE (?1 IS NULL OR device_id = ?1)
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![device_id, limit], map_run)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

// ------------------------------------------------------------
// Leases (one running sync per device across processes)
// ------------------------------------------------------------

/// Try to take the device lease. A lease older than `ttl_secs` is treated as
/// abandoned by a crashed process and taken over.
pub fn acquire_lease(conn: &Connection, device_id: &str, holder: &str, ttl_secs: i64) -> AppResult<bool> {
    let now = Utc::now();
    let stale_before = to_db(&(now - Duration::seconds(ttl_secs)));

    let changed = conn.execute(
        "INSERT INTO sync_leases (device_id, holder, acquired_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(device_id) DO UPDATE SET
             holder = excluded.holder,
             acquired_at = excluded.acquired_at
         WHERE sync_leases.acquired_at < ?4",
        params![device_id, holder, to_db(&now), stale_before],
    )?;
    Ok(changed == 1)
}

pub fn release_lease(conn: &Connection, device_id: &str, holder: &str) -> AppResult<()> {
    conn.execute(
        "DELETE FROM sync_leases WHERE device_id = ?1 AND holder = ?2",
        params![device_id, holder],
    )?;
    Ok(())
}
