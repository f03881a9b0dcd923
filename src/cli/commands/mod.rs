pub mod config;
pub mod cursor;
pub mod db;
pub mod employee;
pub mod events;
pub mod export;
pub mod init;
pub mod log;
pub mod runs;
pub mod sessions;
pub mod sync;

use crate::config::Config;
use crate::db::initialize::init_db;
use crate::db::pool::DbPool;
use crate::errors::AppResult;

/// Open the configured database with the schema brought up to date.
pub(crate) fn open_pool(cfg: &Config) -> AppResult<DbPool> {
    let pool = DbPool::new(&cfg.database)?;
    init_db(&pool.conn)?;
    Ok(pool)
}
