use rusqlite::{Connection, OptionalExtension, Result};
use tracing::info;

/// Ensure that the `log` table exists with the modern schema.
fn ensure_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS log (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            date      TEXT NOT NULL,
            operation TEXT NOT NULL,
            target    TEXT DEFAULT '',
            message   TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Employee directory. `(namespace, device_code)` is unique so that two
/// concurrent auto-provisionings of the same code collapse into one row.
fn create_employees_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS employees (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            namespace     TEXT NOT NULL DEFAULT 'default',
            device_code   TEXT,
            barcode       TEXT,
            display_name  TEXT NOT NULL,
            placeholder   INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS uq_employees_ns_code
            ON employees(namespace, device_code);
        CREATE INDEX IF NOT EXISTS idx_employees_barcode ON employees(barcode);
        "#,
    )?;
    Ok(())
}

/// Attendance ledger: sessions plus the raw device event rows.
fn create_ledger_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS attendance_sessions (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            employee_id    INTEGER NOT NULL REFERENCES employees(id),
            check_in       TEXT NOT NULL,
            check_out      TEXT,
            source_device  TEXT NOT NULL DEFAULT '',
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_open
            ON attendance_sessions(employee_id, check_out);

        CREATE TABLE IF NOT EXISTS device_events (
            id                    INTEGER PRIMARY KEY AUTOINCREMENT,
            employee_id           INTEGER NOT NULL REFERENCES employees(id),
            employee_device_code  TEXT NOT NULL,
            punched_at            TEXT NOT NULL,
            source_device_id      TEXT NOT NULL,
            raw_punch_type        TEXT,
            punch_hint            TEXT NOT NULL DEFAULT 'unknown'
                                  CHECK(punch_hint IN ('in','out','unknown')),
            verify_mode           TEXT NOT NULL DEFAULT 'other',
            created_at            TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS uq_device_events_emp_ts
            ON device_events(employee_id, punched_at);
        "#,
    )?;
    Ok(())
}

/// Per-device watermark, run audit trail and cross-process run lease.
fn create_sync_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sync_cursors (
            device_id        TEXT PRIMARY KEY,
            last_fetched_at  TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_runs (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id      TEXT NOT NULL,
            range_start    TEXT NOT NULL,
            range_end      TEXT NOT NULL,
            status         TEXT NOT NULL DEFAULT 'success'
                           CHECK(status IN ('success','partial','failed')),
            created_count  INTEGER NOT NULL DEFAULT 0,
            skipped_count  INTEGER NOT NULL DEFAULT 0,
            dropped_count  INTEGER NOT NULL DEFAULT 0,
            message        TEXT NOT NULL DEFAULT '',
            started_at     TEXT NOT NULL,
            finished_at    TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sync_runs_device ON sync_runs(device_id, id);

        CREATE TABLE IF NOT EXISTS sync_leases (
            device_id    TEXT PRIMARY KEY,
            holder       TEXT NOT NULL,
            acquired_at  TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn migration_applied(conn: &Connection, version: &str) -> Result<bool> {
    let mut chk = conn.prepare(
        "SELECT 1 FROM log
         WHERE operation = 'migration_applied' AND target = ?1
         LIMIT 1",
    )?;
    Ok(chk.query_row([version], |_| Ok(())).optional()?.is_some())
}

fn mark_applied(conn: &Connection, version: &str, message: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO log (date, operation, target, message)
         VALUES (datetime('now'), 'migration_applied', ?1, ?2)",
        [version, message],
    )?;
    Ok(())
}

fn create_base_schema(conn: &Connection) -> Result<()> {
    create_employees_table(conn)?;
    create_ledger_tables(conn)?;
    create_sync_tables(conn)
}

type Step = fn(&Connection) -> Result<()>;

/// Named schema steps, applied once each and in order. New schema changes
/// go at the end.
const MIGRATIONS: &[(&str, &str, Step)] = &[(
    "0001_base_schema",
    "Created employees, ledger and sync tables",
    create_base_schema,
)];

/// Public entry point: run all pending migrations.
///
/// Invoked by db::initialize::init_db() and before every command touching the DB.
pub fn run_pending_migrations(conn: &Connection) -> Result<()> {
    ensure_log_table(conn)?;

    for (version, message, step) in MIGRATIONS {
        if migration_applied(conn, version)? {
            continue;
        }
        step(conn)?;
        mark_applied(conn, version, message)?;
        info!(version, "migration applied");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_exists(conn: &Connection, table: &str, column: &str) -> bool {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info('{table}')")).unwrap();
        let cols: Vec<String> = stmt
            .query_map([], |row| row.get(1))
            .unwrap()
            .map(|c| c.unwrap())
            .collect();
        cols.iter().any(|c| c == column)
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_pending_migrations(&conn).unwrap();
        run_pending_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM log WHERE operation = 'migration_applied'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(applied, 1);
        assert!(column_exists(&conn, "device_events", "verify_mode"));
        assert!(column_exists(&conn, "sync_runs", "dropped_count"));
    }

    #[test]
    fn base_schema_carries_every_column() {
        let conn = Connection::open_in_memory().unwrap();
        run_pending_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO sync_runs (device_id, range_start, range_end, started_at)
             VALUES ('gate', 'a', 'b', 'c')",
            [],
        )
        .unwrap();
        let dropped: i64 = conn
            .query_row("SELECT dropped_count FROM sync_runs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(dropped, 0);
    }
}
