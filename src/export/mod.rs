//! Session ledger export (CSV / JSON).

mod fs_utils;

use crate::db::pool::DbPool;
use crate::db::queries::{load_employees, load_sessions};
use crate::errors::{AppError, AppResult};
use crate::models::employee::Employee;
use crate::ui::messages::{info, success, warning};
use crate::utils::time::to_db;
use clap::ValueEnum;
use fs_utils::ensure_writable;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

/// One flat row per session.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SessionExport {
    pub session_id: i64,
    pub employee_id: i64,
    pub employee_code: String,
    pub employee_name: String,
    pub check_in: String,
    pub check_out: String,
    pub worked_minutes: Option<i64>,
    pub source_device: String,
}

pub fn load_rows(pool: &DbPool, employee: Option<i64>) -> AppResult<Vec<SessionExport>> {
    let employees: HashMap<i64, Employee> = load_employees(&pool.conn)?
        .into_iter()
        .map(|e| (e.id, e))
        .collect();

    Ok(load_sessions(&pool.conn, employee, false)?
        .into_iter()
        .map(|s| {
            let emp = employees.get(&s.employee_id);
            SessionExport {
                session_id: s.id,
                employee_id: s.employee_id,
                employee_code: emp.and_then(|e| e.device_code.clone()).unwrap_or_default(),
                employee_name: emp.map(|e| e.display_name.clone()).unwrap_or_default(),
                check_in: to_db(&s.check_in),
                check_out: s.check_out.as_ref().map(to_db).unwrap_or_default(),
                worked_minutes: s.worked_minutes(),
                source_device: s.source_device,
            }
        })
        .collect())
}

fn write_json(rows: &[SessionExport], path: &Path) -> AppResult<()> {
    let data = serde_json::to_string_pretty(rows)?;
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    Ok(())
}

fn write_csv(rows: &[SessionExport], path: &Path) -> AppResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub struct ExportLogic;

impl ExportLogic {
    /// Export sessions to `file` (absolute path).
    pub fn export(
        pool: &mut DbPool,
        format: ExportFormat,
        file: &str,
        employee: Option<i64>,
        force: bool,
    ) -> AppResult<()> {
        let path = Path::new(file);
        if !path.is_absolute() {
            return Err(AppError::from(io::Error::other(format!(
                "Output file path must be absolute: {file}"
            ))));
        }

        ensure_writable(path, force)?;

        let rows = load_rows(pool, employee)?;
        if rows.is_empty() {
            warning("No sessions to export.");
            return Ok(());
        }

        info(format!("Exporting {} sessions to {}", rows.len(), path.display()));
        match format {
            ExportFormat::Csv => write_csv(&rows, path)?,
            ExportFormat::Json => write_json(&rows, path)?,
        }
        success(format!("Export completed: {}", path.display()));
        Ok(())
    }
}
