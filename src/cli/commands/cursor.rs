use crate::cli::parser::Commands;
use crate::config::Config;
use crate::db::log::ttlog;
use crate::db::sync_state::{load_cursor, reset_cursor};
use crate::errors::AppResult;
use crate::ui::messages::{info, success};
use crate::utils::time::to_db;

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Cursor { device, reset } = cmd {
        let pool = super::open_pool(cfg)?;

        if *reset {
            if reset_cursor(&pool.conn, device)? {
                ttlog(&pool.conn, "cursor_reset", device, "Cursor cleared")?;
                success(format!("Cursor for '{device}' cleared"));
            } else {
                info(format!("No cursor stored for '{device}'"));
            }
            return Ok(());
        }

        match load_cursor(&pool.conn, device)? {
            Some(c) => println!("{}: last fetched up to {}", device, to_db(&c.last_fetched_at)),
            None => info(format!("'{device}' has never completed a sync")),
        }
    }
    Ok(())
}
