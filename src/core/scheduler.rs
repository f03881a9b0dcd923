//! Entry points that run syncs: single device and fan-out over all devices.
//!
//! Runs of the same device never overlap. Inside a process a per-device
//! mutex queues them; across processes the `sync_leases` row rejects the
//! second one with `SyncInProgress`.

use crate::adapters::{DeviceAdapter, build_adapter};
use crate::config::{Config, DeviceConfig};
use crate::core::orchestrator::{MESSAGE_LIMIT, sync_range, truncate_message};
use crate::db::pool::DbPool;
use crate::db::sync_state::{acquire_lease, begin_run, finish_run, load_cursor, load_run, release_lease};
use crate::errors::{AppError, AppResult};
use crate::models::sync_run::{RunStatus, SyncRun};
use crate::utils::time::to_db;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::thread;
use tracing::{error, info, warn};

pub type AdapterFactory = dyn Fn(&Config, &DeviceConfig) -> AppResult<Box<dyn DeviceAdapter>> + Sync;

/// Per-device mutex registry.
#[derive(Default)]
pub struct DeviceLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DeviceLocks {
    pub fn lock_for(&self, device_id: &str) -> Arc<Mutex<()>> {
        self.inner
            .lock()
            .entry(device_id.to_string())
            .or_default()
            .clone()
    }
}

static LOCKS: LazyLock<DeviceLocks> = LazyLock::new(DeviceLocks::default);

fn holder_id() -> String {
    format!("{}:{:?}", std::process::id(), thread::current().id())
}

/// Range for a scheduled run: from the cursor minus the overlap, or the
/// initial lookback when the device was never synced; up to `now`.
pub fn incremental_range(
    conn: &Connection,
    cfg: &Config,
    device_id: &str,
    now: DateTime<Utc>,
) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    let from = match load_cursor(conn, device_id)? {
        Some(c) => c.last_fetched_at - Duration::minutes(cfg.overlap_minutes),
        None => now - Duration::hours(cfg.initial_lookback_hours),
    };
    Ok((from.min(now), now))
}

/// Run one device under its in-process lock and cross-process lease.
/// `range` defaults to the incremental range.
pub fn run_device(
    pool: &mut DbPool,
    cfg: &Config,
    device: &DeviceConfig,
    adapter: &mut dyn DeviceAdapter,
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> AppResult<SyncRun> {
    let lock = LOCKS.lock_for(&device.id);
    let _guard = lock.lock();

    let holder = holder_id();
    if !acquire_lease(&pool.conn, &device.id, &holder, cfg.lease_ttl_secs)? {
        return Err(AppError::SyncInProgress(device.id.clone()));
    }

    let result = leased_run(pool, cfg, device, adapter, range);

    if let Err(e) = release_lease(&pool.conn, &device.id, &holder) {
        warn!(device = %device.id, "failed to release lease: {e}");
    }
    result
}

fn leased_run(
    pool: &mut DbPool,
    cfg: &Config,
    device: &DeviceConfig,
    adapter: &mut dyn DeviceAdapter,
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> AppResult<SyncRun> {
    let (from, to) = match range {
        Some(r) => r,
        None => incremental_range(&pool.conn, cfg, &device.id, Utc::now())?,
    };
    sync_range(pool, cfg, device, adapter, from, to)
}

/// Build the device's adapter and run it.
pub fn sync_device(
    pool: &mut DbPool,
    cfg: &Config,
    device_id: &str,
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> AppResult<SyncRun> {
    if let Some((from, to)) = range {
        if to < from {
            return Err(AppError::InvalidRange {
                start: to_db(&from),
                end: to_db(&to),
            });
        }
    }
    let device = cfg.device(device_id)?;
    let mut adapter = build_adapter(cfg, device)?;
    run_device(pool, cfg, device, adapter.as_mut(), range)
}

fn failed_run(id: i64, device_id: &str, from: DateTime<Utc>, to: DateTime<Utc>, message: &str) -> SyncRun {
    SyncRun {
        id,
        device_id: device_id.to_string(),
        range_start: from,
        range_end: to,
        status: RunStatus::Failed,
        created_count: 0,
        skipped_count: 0,
        dropped_count: 0,
        message: truncate_message(message, MESSAGE_LIMIT),
        started_at: to_db(&Utc::now()),
        finished_at: Some(to_db(&Utc::now())),
    }
}

/// Failed run that could not be stored (id 0).
fn unrecorded_failure(device_id: &str, message: &str) -> SyncRun {
    let now = Utc::now();
    failed_run(0, device_id, now, now, message)
}

/// Store a failed run for an error that stopped a run before it started.
fn record_failure(conn: &Connection, cfg: &Config, device_id: &str, err: &AppError) -> AppResult<SyncRun> {
    let now = Utc::now();
    let (from, to) = incremental_range(conn, cfg, device_id, now).unwrap_or((now, now));
    let id = begin_run(conn, device_id, &from, &to)?;

    let run = failed_run(id, device_id, from, to, &err.to_string());
    finish_run(conn, &run)?;
    Ok(load_run(conn, id)?.unwrap_or(run))
}

fn run_one(cfg: &Config, device: &DeviceConfig, factory: &AdapterFactory) -> SyncRun {
    let mut pool = match DbPool::new(&cfg.database) {
        Ok(p) => p,
        Err(e) => {
            error!(device = %device.id, "cannot open database: {e}");
            return unrecorded_failure(&device.id, &e.to_string());
        }
    };

    let outcome = factory(cfg, device)
        .and_then(|mut adapter| run_device(&mut pool, cfg, device, adapter.as_mut(), None));

    match outcome {
        Ok(run) => run,
        Err(e) => {
            warn!(device = %device.id, "sync did not start: {e}");
            match record_failure(&pool.conn, cfg, &device.id, &e) {
                Ok(run) => run,
                Err(db_err) => {
                    error!(device = %device.id, "cannot record failed run: {db_err}");
                    unrecorded_failure(&device.id, &e.to_string())
                }
            }
        }
    }
}

/// One run per enabled device, concurrently, each on its own connection.
pub fn sync_all_with(cfg: &Config, factory: &AdapterFactory) -> Vec<SyncRun> {
    let devices: Vec<&DeviceConfig> = cfg.devices.iter().filter(|d| d.enabled).collect();
    info!(devices = devices.len(), "sync-all started");

    thread::scope(|scope| {
        let handles: Vec<_> = devices
            .iter()
            .map(|device| (device.id.clone(), scope.spawn(move || run_one(cfg, device, factory))))
            .collect();

        handles
            .into_iter()
            .filter_map(|(id, h)| match h.join() {
                Ok(run) => Some(run),
                Err(_) => {
                    error!(device = %id, "sync worker panicked");
                    None
                }
            })
            .collect()
    })
}

pub fn sync_all(cfg: &Config) -> Vec<SyncRun> {
    sync_all_with(cfg, &build_adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate::run_pending_migrations;
    use crate::db::sync_state::save_cursor;
    use crate::utils::time::from_db;

    #[test]
    fn range_starts_from_cursor_minus_overlap() {
        let c = Connection::open_in_memory().unwrap();
        run_pending_migrations(&c).unwrap();
        let cfg = Config::with_database(":memory:");
        let now = from_db("2024-05-02T00:00:00Z").unwrap();

        let (from, to) = incremental_range(&c, &cfg, "gate", now).unwrap();
        assert_eq!(from, from_db("2024-05-01T00:00:00Z").unwrap());
        assert_eq!(to, now);

        save_cursor(&c, "gate", &from_db("2024-05-01T20:00:00Z").unwrap()).unwrap();
        let (from, _) = incremental_range(&c, &cfg, "gate", now).unwrap();
        assert_eq!(from, from_db("2024-05-01T19:55:00Z").unwrap());
    }

    #[test]
    fn same_device_shares_one_lock() {
        let locks = DeviceLocks::default();
        let a = locks.lock_for("gate");
        let b = locks.lock_for("gate");
        let other = locks.lock_for("lobby");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));

        let _held = a.lock();
        assert!(b.try_lock().is_none());
        assert!(other.try_lock().is_some());
    }
}
