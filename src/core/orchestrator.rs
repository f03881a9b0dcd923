//! One sync run: page through a device, normalize, resolve, dedup and
//! reconcile, then record the outcome.

use crate::adapters::{DeviceAdapter, FetchedPage, PageRequest};
use crate::config::{Config, DeviceConfig};
use crate::core::normalizer::normalize;
use crate::core::reconciler::{Applied, Outcome, apply_event};
use crate::core::resolver::{Resolution, resolve};
use crate::db::log::ttlog;
use crate::db::pool::DbPool;
use crate::db::sync_state::{begin_run, finish_run, load_run, save_cursor};
use crate::errors::{AppError, AppResult};
use crate::models::raw_event::RawEvent;
use crate::models::sync_run::{RunStatus, SyncRun};
use crate::utils::time::to_db;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

pub const MESSAGE_LIMIT: usize = 500;

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    created: u32,
    skipped: u32,
    dropped: u32,
    events: u32,
}

pub fn truncate_message(msg: &str, limit: usize) -> String {
    if msg.chars().count() <= limit {
        msg.to_string()
    } else {
        msg.chars().take(limit).collect()
    }
}

/// Try each request variant in order; the first success wins.
/// On total failure returns the last error text.
fn fetch_with_fallback(
    adapter: &mut dyn DeviceAdapter,
    req: &PageRequest,
) -> Result<FetchedPage, String> {
    let variants = adapter.request_variants().to_vec();
    let mut last_error = String::from("adapter offers no request variants");

    for variant in variants {
        match adapter.fetch_page(req, variant) {
            Ok(page) => {
                debug!(device = adapter.device_id(), page = req.page, variant = variant.name(), "page fetched");
                return Ok(page);
            }
            Err(e) => {
                warn!(device = adapter.device_id(), page = req.page, variant = variant.name(), "fetch failed: {e}");
                last_error = format!("page {} ({}): {e}", req.page, variant.name());
            }
        }
    }
    Err(last_error)
}

fn process_event(
    pool: &mut DbPool,
    cfg: &Config,
    device: &DeviceConfig,
    event: &RawEvent,
    counts: &mut Counts,
) -> AppResult<()> {
    let policy = cfg.unknown_policy_for(device);
    let resolution = resolve(&pool.conn, &device.namespace, event, policy)?;

    let employee = match &resolution {
        Resolution::Found(e) | Resolution::Provisioned(e) => e,
        Resolution::Unknown => {
            debug!(device = %device.id, code = %event.device_employee_code, "unknown employee skipped");
            counts.skipped += 1;
            return Ok(());
        }
    };

    let applied = apply_event(&mut pool.conn, employee.id, event, &device.id, cfg.close_order)?;
    match applied {
        Applied::Reconciled(Outcome::Opened(_) | Outcome::Closed(_)) => counts.created += 1,
        Applied::Duplicate
        | Applied::Reconciled(Outcome::SelfPaired)
        | Applied::Reconciled(Outcome::OutOfOrder)
        | Applied::Reconciled(Outcome::OrphanOut) => counts.skipped += 1,
    }
    Ok(())
}

/// Sync `[from, to]` for one device through `adapter`.
///
/// Invalid ranges and configuration errors are returned before any run
/// record is written. Transport failures never escape: they end up in the
/// run's status and message.
pub fn sync_range(
    pool: &mut DbPool,
    cfg: &Config,
    device: &DeviceConfig,
    adapter: &mut dyn DeviceAdapter,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> AppResult<SyncRun> {
    if to < from {
        return Err(AppError::InvalidRange {
            start: to_db(&from),
            end: to_db(&to),
        });
    }
    device.validate()?;
    let offset = device.offset()?;
    let page_size = cfg.page_size_for(device);

    let run_id = begin_run(&pool.conn, &device.id, &from, &to)?;
    info!(device = %device.id, run = run_id, from = %to_db(&from), to = %to_db(&to), "sync started");

    let mut counts = Counts::default();
    let mut failure: Option<String> = None;

    let max_pages = cfg.max_pages.max(1);
    for page_no in 1..=max_pages {
        let req = PageRequest {
            range_start: from,
            range_end: to,
            page: page_no,
            page_size,
        };

        let page = match fetch_with_fallback(adapter, &req) {
            Ok(p) => p,
            Err(e) => {
                failure = Some(e);
                break;
            }
        };

        let normalized = normalize(&page.payload, &offset);
        counts.dropped += normalized.dropped;
        if normalized.records == 0 {
            debug!(device = %device.id, page = page_no, "empty page, done");
            break;
        }
        counts.events += normalized.events.len() as u32;

        let mut page_error = None;
        for event in &normalized.events {
            if let Err(e) = process_event(pool, cfg, device, event, &mut counts) {
                page_error = Some(e);
                break;
            }
        }
        if let Some(e) = page_error {
            warn!(device = %device.id, page = page_no, "event processing failed: {e}");
            failure = Some(format!("page {page_no}: {e}"));
            break;
        }

        if page.more == Some(false) {
            break;
        }
        if page_no == max_pages {
            warn!(device = %device.id, max_pages, "page limit reached, stopping");
            failure = Some(format!(
                "page limit ({max_pages}) reached before the device ran out of events"
            ));
        }
    }

    let (status, message) = match failure {
        None => (
            RunStatus::Success,
            format!(
                "{} created, {} skipped, {} dropped",
                counts.created, counts.skipped, counts.dropped
            ),
        ),
        Some(err) if counts.events > 0 => (RunStatus::Partial, err),
        Some(err) => (RunStatus::Failed, err),
    };

    let run = SyncRun {
        id: run_id,
        device_id: device.id.clone(),
        range_start: from,
        range_end: to,
        status,
        created_count: counts.created,
        skipped_count: counts.skipped,
        dropped_count: counts.dropped,
        message: truncate_message(&message, MESSAGE_LIMIT),
        started_at: String::new(),
        finished_at: Some(to_db(&Utc::now())),
    };
    finish_run(&pool.conn, &run)?;

    if status == RunStatus::Success {
        save_cursor(&pool.conn, &device.id, &to)?;
    }

    let operation = if status == RunStatus::Success { "sync" } else { "sync_failed" };
    ttlog(
        &pool.conn,
        operation,
        &device.id,
        &format!("{}: {}", status.to_db_str(), run.message),
    )?;
    info!(
        device = %device.id,
        run = run_id,
        status = status.to_db_str(),
        created = counts.created,
        skipped = counts.skipped,
        dropped = counts.dropped,
        "sync finished"
    );

    load_run(&pool.conn, run_id)?.ok_or_else(|| AppError::Other(format!("sync run {run_id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_truncated_on_char_boundaries() {
        let long = "é".repeat(600);
        let t = truncate_message(&long, MESSAGE_LIMIT);
        assert_eq!(t.chars().count(), 500);
        assert_eq!(truncate_message("short", MESSAGE_LIMIT), "short");
    }
}
