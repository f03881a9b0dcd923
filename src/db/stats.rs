use crate::db::pool::DbPool;
use crate::utils::colors::{CYAN, GREEN, GREY, RESET, YELLOW};
use rusqlite::OptionalExtension;
use std::fs;

fn count(pool: &DbPool, sql: &str) -> rusqlite::Result<i64> {
    pool.conn.query_row(sql, [], |row| row.get(0))
}

pub fn print_db_info(pool: &mut DbPool, db_path: &str) -> rusqlite::Result<()> {
    println!();

    //
    // 1) FILE SIZE
    //
    let file_size = fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);
    let file_mb = (file_size as f64) / (1024.0 * 1024.0);

    println!("{}• File:{} {}{}{}", CYAN, RESET, YELLOW, db_path, RESET);
    println!("{}• Size:{} {:.2} MB", CYAN, RESET, file_mb);

    //
    // 2) TOTALS
    //
    let rows = [
        ("Employees", "SELECT COUNT(*) FROM employees"),
        ("Placeholders", "SELECT COUNT(*) FROM employees WHERE placeholder = 1"),
        ("Device events", "SELECT COUNT(*) FROM device_events"),
        ("Sessions", "SELECT COUNT(*) FROM attendance_sessions"),
        (
            "Open sessions",
            "SELECT COUNT(*) FROM attendance_sessions WHERE check_out IS NULL",
        ),
        ("Sync runs", "SELECT COUNT(*) FROM sync_runs"),
    ];
    for (label, sql) in rows {
        println!(
            "{}• {}:{} {}{}{}",
            CYAN,
            label,
            RESET,
            GREEN,
            count(pool, sql)?,
            RESET
        );
    }

    //
    // 3) PUNCH RANGE
    //
    let first: Option<String> = pool
        .conn
        .query_row(
            "SELECT punched_at FROM device_events ORDER BY punched_at ASC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let last: Option<String> = pool
        .conn
        .query_row(
            "SELECT punched_at FROM device_events ORDER BY punched_at DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    println!("{}• Punch range:{}", CYAN, RESET);
    println!(
        "    from: {}",
        first.unwrap_or_else(|| format!("{GREY}--{RESET}"))
    );
    println!(
        "    to:   {}",
        last.unwrap_or_else(|| format!("{GREY}--{RESET}"))
    );

    println!();
    Ok(())
}
