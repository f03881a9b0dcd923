use crate::cli::parser::Cli;
use crate::config::Config;
use crate::db::initialize::init_db;
use crate::db::log;
use crate::errors::AppResult;
use rusqlite::Connection;
use std::path::Path;

/// Handle the `init` command
///
/// Creates the config directory and file (skipped with `--test`), the SQLite
/// database and its schema.
pub fn handle(cli: &Cli, config_path: &Path) -> AppResult<()> {
    println!("⚙️  Initializing punchsync…");
    let cfg = Config::init_all(config_path, cli.db.clone(), cli.test)?;
    let db_path = cfg.database.clone();

    let conn = Connection::open(&db_path)?;
    init_db(&conn)?;
    println!("✅ Database initialized at {}", &db_path);

    // the audit line is best effort
    if let Err(e) = log::ttlog(
        &conn,
        "init",
        "database",
        &format!("Database initialized at {}", &db_path),
    ) {
        eprintln!("⚠️ Failed to write internal log: {}", e);
    }

    println!("🎉 punchsync initialization completed!");
    Ok(())
}
