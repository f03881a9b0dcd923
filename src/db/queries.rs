use crate::errors::{AppError, AppResult};
use crate::models::device_event::DeviceEventRecord;
use crate::models::employee::Employee;
use crate::models::punch_hint::{PunchHint, VerifyMode};
use crate::models::raw_event::RawEvent;
use crate::models::session::{AttendanceSession, CloseOrder};
use crate::utils::time::{from_db, to_db};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

fn conversion_error(idx: usize, err: AppError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn get_instant(row: &Row, name: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.get(name)?;
    from_db(&raw).map_err(|e| conversion_error(0, e))
}

// ------------------------------------------------------------
// Employees
// ------------------------------------------------------------

pub fn map_employee(row: &Row) -> Result<Employee> {
    Ok(Employee {
        id: row.get("id")?,
        namespace: row.get("namespace")?,
        device_code: row.get("device_code")?,
        barcode: row.get("barcode")?,
        display_name: row.get("display_name")?,
        placeholder: row.get::<_, i32>("placeholder")? == 1,
        created_at: row.get("created_at")?,
    })
}

pub fn find_employee_by_device_code(
    conn: &Connection,
    namespace: &str,
    code: &str,
) -> AppResult<Option<Employee>> {
    let mut stmt = conn.prepare_cached(
        "SELECT * FROM employees WHERE namespace = ?1 AND device_code = ?2 LIMIT 1",
    )?;
    Ok(stmt.query_row(params![namespace, code], map_employee).optional()?)
}

pub fn find_employee_by_barcode(
    conn: &Connection,
    namespace: &str,
    code: &str,
) -> AppResult<Option<Employee>> {
    let mut stmt = conn.prepare_cached(
        "SELECT * FROM employees WHERE namespace = ?1 AND barcode = ?2 ORDER BY id ASC LIMIT 1",
    )?;
    Ok(stmt.query_row(params![namespace, code], map_employee).optional()?)
}

pub fn find_employee_by_id(conn: &Connection, id: i64) -> AppResult<Option<Employee>> {
    let mut stmt = conn.prepare_cached("SELECT * FROM employees WHERE id = ?1")?;
    Ok(stmt.query_row([id], map_employee).optional()?)
}

/// Plain insert used by the operator CLI. Fails on a duplicate code.
pub fn insert_employee(
    conn: &Connection,
    namespace: &str,
    device_code: Option<&str>,
    barcode: Option<&str>,
    display_name: &str,
) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO employees (namespace, device_code, barcode, display_name, placeholder, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        params![
            namespace,
            device_code,
            barcode,
            display_name,
            to_db(&Utc::now())
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert a placeholder unless the code already exists; returns true when a
/// row was actually created.
pub fn insert_placeholder_employee(
    conn: &Connection,
    namespace: &str,
    device_code: &str,
    display_name: &str,
) -> AppResult<bool> {
    let changed = conn.execute(
        "INSERT INTO employees (namespace, device_code, barcode, display_name, placeholder, created_at)
         VALUES (?1, ?2, NULL, ?3, 1, ?4)
         ON CONFLICT(namespace, device_code) DO NOTHING",
        params![namespace, device_code, display_name, to_db(&Utc::now())],
    )?;
    Ok(changed == 1)
}

pub fn load_employees(conn: &Connection) -> AppResult<Vec<Employee>> {
    let mut stmt = conn.prepare("SELECT * FROM employees ORDER BY namespace, id")?;
    let rows = stmt.query_map([], map_employee)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

// ------------------------------------------------------------
// Sessions
// ------------------------------------------------------------

pub fn map_session(row: &Row) -> Result<AttendanceSession> {
    let check_out: Option<String> = row.get("check_out")?;
    let check_out = match check_out {
        Some(s) => Some(from_db(&s).map_err(|e| conversion_error(0, e))?),
        None => None,
    };

    Ok(AttendanceSession {
        id: row.get("id")?,
        employee_id: row.get("employee_id")?,
        check_in: get_instant(row, "check_in")?,
        check_out,
        source_device: row.get("source_device")?,
    })
}

/// The open session a closing event should target, per tie-break.
pub fn find_open_session(
    conn: &Connection,
    employee_id: i64,
    order: CloseOrder,
) -> AppResult<Option<AttendanceSession>> {
    let sql = match order {
        CloseOrder::Latest => {
            "SELECT * FROM attendance_sessions
             WHERE employee_id = ?1 AND check_out IS NULL
             ORDER BY check_in DESC, id DESC LIMIT 1"
        }
        CloseOrder::Earliest => {
            "SELECT * FROM attendance_sessions
             WHERE employee_id = ?1 AND check_out IS NULL
             ORDER BY check_in ASC, id ASC LIMIT 1"
        }
    };
    let mut stmt = conn.prepare_cached(sql)?;
    Ok(stmt.query_row([employee_id], map_session).optional()?)
}

pub fn insert_session(
    conn: &Connection,
    employee_id: i64,
    check_in: &DateTime<Utc>,
    source_device: &str,
) -> AppResult<i64> {
    let now = to_db(&Utc::now());
    conn.execute(
        "INSERT INTO attendance_sessions (employee_id, check_in, check_out, source_device, created_at, updated_at)
         VALUES (?1, ?2, NULL, ?3, ?4, ?4)",
        params![employee_id, to_db(check_in), source_device, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn close_session(conn: &Connection, session_id: i64, check_out: &DateTime<Utc>) -> AppResult<()> {
    conn.execute(
        "UPDATE attendance_sessions SET check_out = ?1, updated_at = ?2 WHERE id = ?3",
        params![to_db(check_out), to_db(&Utc::now()), session_id],
    )?;
    Ok(())
}

pub fn load_sessions(
    conn: &Connection,
    employee_id: Option<i64>,
    only_open: bool,
) -> AppResult<Vec<AttendanceSession>> {
    let mut sql = String::from("SELECT * FROM attendance_sessions WHERE 1 = 1");
    if employee_id.is_some() {
        sql.push_str(" AND employee_id = ?1");
    }
    if only_open {
        sql.push_str(" AND check_out IS NULL");
    }
    sql.push_str(" ORDER BY employee_id ASC, check_in ASC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = match employee_id {
        Some(id) => stmt.query_map([id], map_session)?,
        None => stmt.query_map([], map_session)?,
    };

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

// ------------------------------------------------------------
// Device events (dedup ledger)
// ------------------------------------------------------------

pub fn device_event_exists(
    conn: &Connection,
    employee_id: i64,
    punched_at: &DateTime<Utc>,
) -> AppResult<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM device_events WHERE employee_id = ?1 AND punched_at = ?2 LIMIT 1",
    )?;
    Ok(stmt.exists(params![employee_id, to_db(punched_at)])?)
}

pub fn insert_device_event(
    conn: &Connection,
    employee_id: i64,
    event: &RawEvent,
    source_device_id: &str,
) -> AppResult<i64> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO device_events
            (employee_id, employee_device_code, punched_at, source_device_id,
             raw_punch_type, punch_hint, verify_mode, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    stmt.execute(params![
        employee_id,
        event.device_employee_code,
        to_db(&event.timestamp),
        source_device_id,
        event.raw_punch_type,
        event.punch_hint.to_db_str(),
        event.verify_mode.to_db_str(),
        to_db(&Utc::now()),
    ])?;
    Ok(conn.last_insert_rowid())
}

fn map_device_event(row: &Row) -> Result<DeviceEventRecord> {
    let hint: String = row.get("punch_hint")?;
    let mode: String = row.get("verify_mode")?;
    Ok(DeviceEventRecord {
        id: row.get("id")?,
        employee_id: row.get("employee_id")?,
        employee_device_code: row.get("employee_device_code")?,
        timestamp: get_instant(row, "punched_at")?,
        source_device_id: row.get("source_device_id")?,
        raw_punch_type: row.get("raw_punch_type")?,
        punch_hint: PunchHint::from_db_str(&hint).unwrap_or_default(),
        verify_mode: VerifyMode::from_db_str(&mode),
    })
}

pub fn load_device_events(conn: &Connection, employee_id: i64) -> AppResult<Vec<DeviceEventRecord>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM device_events WHERE employee_id = ?1 ORDER BY punched_at ASC, id ASC",
    )?;
    let rows = stmt.query_map([employee_id], map_device_event)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}
