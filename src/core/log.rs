use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::utils::table::strip_ansi;
use ansi_term::Colour;

const OP_TARGET_MAX: usize = 60;

/// Color of an operation in the log view.
fn color_for_operation(op: &str) -> Colour {
    match op {
        "sync" => Colour::Green,
        "sync_failed" => Colour::Red,
        "employee_add" | "employee_provisioned" => Colour::Cyan,
        "cursor_reset" => Colour::Yellow,
        "migration_applied" => Colour::Purple,
        "init" => Colour::RGB(255, 153, 51),
        _ => Colour::White,
    }
}

struct LogRow {
    id: i64,
    date: String,
    operation: String,
    target: String,
    message: String,
}

impl LogRow {
    fn op_target(&self) -> String {
        if self.target.is_empty() {
            self.operation.clone()
        } else {
            format!("{} ({})", self.operation, self.target)
        }
    }
}

/// Colored `operation (target)` cut to `OP_TARGET_MAX` visible chars.
fn render_op_target(row: &LogRow) -> String {
    let color = color_for_operation(&row.operation);
    let plain = row.op_target();

    let visible = if plain.chars().count() > OP_TARGET_MAX {
        let mut s: String = plain.chars().take(OP_TARGET_MAX - 3).collect();
        s.push_str("...");
        s
    } else {
        plain
    };

    // only the operation word is colored
    match visible.split_once(' ') {
        Some((op, rest)) => format!("{} {}", color.paint(op), rest),
        None => color.paint(visible.as_str()).to_string(),
    }
}

pub struct LogLogic;

impl LogLogic {
    pub fn print_log(pool: &mut DbPool) -> AppResult<()> {
        let mut stmt = pool.conn.prepare_cached(
            "SELECT id, date, operation, target, message FROM log ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            let raw_date: String = row.get(1)?;
            let date = chrono::DateTime::parse_from_rfc3339(&raw_date)
                .map(|dt| dt.format("%FT%T%:z").to_string())
                .unwrap_or(raw_date);

            Ok(LogRow {
                id: row.get(0)?,
                date,
                operation: row.get(2)?,
                target: row.get(3)?,
                message: row.get(4)?,
            })
        })?;

        let mut entries = Vec::new();
        for r in rows {
            entries.push(r?);
        }

        if entries.is_empty() {
            println!("📜 Internal log is empty.");
            return Ok(());
        }

        let id_w = entries.iter().map(|e| e.id.to_string().len()).max().unwrap_or(1);
        let date_w = entries.iter().map(|e| e.date.len()).max().unwrap_or(10);
        let op_w = entries
            .iter()
            .map(|e| e.op_target().chars().count())
            .max()
            .unwrap_or(10)
            .min(OP_TARGET_MAX);

        println!("📜 Internal log:\n");

        for e in &entries {
            let op_target = render_op_target(e);
            let padding = " ".repeat(op_w.saturating_sub(strip_ansi(&op_target).chars().count()));
            println!(
                "{:>id_w$}: {:<date_w$} | {}{} => {}",
                e.id, e.date, op_target, padding, e.message
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(op: &str, target: &str) -> LogRow {
        LogRow {
            id: 1,
            date: String::new(),
            operation: op.into(),
            target: target.into(),
            message: String::new(),
        }
    }

    #[test]
    fn long_targets_are_cut_without_counting_color_codes() {
        let r = row("sync", &"x".repeat(100));
        let rendered = render_op_target(&r);
        let visible = strip_ansi(&rendered);
        assert_eq!(visible.chars().count(), OP_TARGET_MAX);
        assert!(visible.starts_with("sync ("));
        assert!(visible.ends_with("..."));
    }
}
