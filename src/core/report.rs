//! Operator views: employees, sync runs and the session ledger.

use crate::db::pool::DbPool;
use crate::db::queries::{find_employee_by_id, load_device_events, load_employees, load_sessions};
use crate::db::sync_state::load_runs;
use crate::errors::{AppError, AppResult};
use crate::models::device_event::DeviceEventRecord;
use crate::models::employee::Employee;
use crate::models::session::AttendanceSession;
use crate::models::sync_run::SyncRun;
use crate::utils::colors::{RESET, YELLOW, color_for_status, colorize_optional};
use crate::utils::table::{Column, Table};
use crate::utils::time::{format_minutes, to_db};
use std::collections::HashMap;

pub fn employees_table(employees: &[Employee]) -> Table {
    let mut t = Table::new(vec![
        Column::new("ID", 3),
        Column::new("NAMESPACE", 9),
        Column::new("CODE", 6),
        Column::new("BARCODE", 7),
        Column::new("NAME", 10),
    ]);

    for e in employees {
        let name = if e.placeholder {
            format!("{YELLOW}{}{RESET} (placeholder)", e.display_name)
        } else {
            e.display_name.clone()
        };
        t.add_row(vec![
            e.id.to_string(),
            e.namespace.clone(),
            colorize_optional(e.device_code.as_deref().unwrap_or("")),
            colorize_optional(e.barcode.as_deref().unwrap_or("")),
            name,
        ]);
    }
    t
}

pub fn runs_table(runs: &[SyncRun]) -> Table {
    let mut t = Table::new(vec![
        Column::new("ID", 3),
        Column::new("DEVICE", 6),
        Column::new("FROM", 20),
        Column::new("TO", 20),
        Column::new("STATUS", 7),
        Column::new("NEW", 3),
        Column::new("SKIP", 4),
        Column::new("DROP", 4),
        Column::wrapped("MESSAGE", 40),
    ]);

    for r in runs {
        t.add_row(vec![
            r.id.to_string(),
            r.device_id.clone(),
            to_db(&r.range_start),
            to_db(&r.range_end),
            format!("{}{}{RESET}", color_for_status(r.status), r.status.to_db_str()),
            r.created_count.to_string(),
            r.skipped_count.to_string(),
            r.dropped_count.to_string(),
            r.message.clone(),
        ]);
    }
    t
}

pub fn sessions_table(sessions: &[AttendanceSession], names: &HashMap<i64, String>) -> Table {
    let mut t = Table::new(vec![
        Column::new("ID", 3),
        Column::new("EMPLOYEE", 10),
        Column::new("CHECK IN", 20),
        Column::new("CHECK OUT", 20),
        Column::new("WORKED", 7),
        Column::new("DEVICE", 6),
    ]);

    for s in sessions {
        let name = names
            .get(&s.employee_id)
            .cloned()
            .unwrap_or_else(|| s.employee_id.to_string());
        t.add_row(vec![
            s.id.to_string(),
            name,
            to_db(&s.check_in),
            colorize_optional(&s.check_out.as_ref().map(to_db).unwrap_or_default()),
            colorize_optional(&s.worked_minutes().map(format_minutes).unwrap_or_default()),
            s.source_device.clone(),
        ]);
    }
    t
}

pub fn events_table(events: &[DeviceEventRecord]) -> Table {
    let mut t = Table::new(vec![
        Column::new("ID", 3),
        Column::new("PUNCHED AT", 20),
        Column::new("CODE", 6),
        Column::new("HINT", 7),
        Column::new("VERIFY", 6),
        Column::new("RAW", 4),
        Column::new("DEVICE", 6),
    ]);

    for e in events {
        t.add_row(vec![
            e.id.to_string(),
            to_db(&e.timestamp),
            e.employee_device_code.clone(),
            e.punch_hint.to_db_str().to_string(),
            e.verify_mode.to_db_str().to_string(),
            colorize_optional(e.raw_punch_type.as_deref().unwrap_or("")),
            e.source_device_id.clone(),
        ]);
    }
    t
}

pub fn print_employees(pool: &mut DbPool) -> AppResult<()> {
    let employees = load_employees(&pool.conn)?;
    if employees.is_empty() {
        println!("No employees.");
        return Ok(());
    }
    print!("{}", employees_table(&employees).render());
    Ok(())
}

pub fn print_runs(pool: &mut DbPool, device: Option<&str>, limit: u32) -> AppResult<()> {
    let runs = load_runs(&pool.conn, device, limit)?;
    if runs.is_empty() {
        println!("No sync runs recorded.");
        return Ok(());
    }
    print!("{}", runs_table(&runs).render());
    Ok(())
}

pub fn print_sessions(pool: &mut DbPool, employee: Option<i64>, only_open: bool) -> AppResult<()> {
    let sessions = load_sessions(&pool.conn, employee, only_open)?;
    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    let names: HashMap<i64, String> = load_employees(&pool.conn)?
        .into_iter()
        .map(|e| (e.id, e.display_name))
        .collect();
    print!("{}", sessions_table(&sessions, &names).render());
    Ok(())
}

pub fn print_events(pool: &mut DbPool, employee_id: i64) -> AppResult<()> {
    let employee = find_employee_by_id(&pool.conn, employee_id)?
        .ok_or_else(|| AppError::Other(format!("employee {employee_id} not found")))?;

    let events = load_device_events(&pool.conn, employee.id)?;
    if events.is_empty() {
        println!("No punches recorded for {}.", employee.display_name);
        return Ok(());
    }
    println!("Punches of {} (id {}):\n", employee.display_name, employee.id);
    print!("{}", events_table(&events).render());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::table::strip_ansi;
    use crate::utils::time::from_db;

    #[test]
    fn open_sessions_show_placeholders() {
        let s = AttendanceSession {
            id: 1,
            employee_id: 7,
            check_in: from_db("2024-05-01T08:00:00Z").unwrap(),
            check_out: None,
            source_device: "gate".into(),
        };
        let names = HashMap::from([(7, "Ada".to_string())]);
        let out = strip_ansi(&sessions_table(&[s], &names).render());
        let row = out.lines().nth(2).unwrap();
        assert!(row.contains("Ada"));
        assert!(row.contains("2024-05-01T08:00:00Z"));
        assert!(row.contains("--"));
    }
}
