use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::report::runs_table;
use crate::core::scheduler::{sync_all, sync_device};
use crate::errors::{AppError, AppResult};
use crate::models::sync_run::{RunStatus, SyncRun};
use crate::ui::messages::{error, success, warning};
use crate::utils::time::parse_range_bound;
use chrono::Utc;

fn report(run: &SyncRun) {
    let line = format!(
        "{} run {}: {} created, {} skipped, {} dropped",
        run.device_id, run.id, run.created_count, run.skipped_count, run.dropped_count
    );
    match run.status {
        RunStatus::Success => success(line),
        RunStatus::Partial => warning(format!("{line} (partial: {})", run.message)),
        RunStatus::Failed => error(format!("{} run {} failed: {}", run.device_id, run.id, run.message)),
    }
}

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    match cmd {
        Commands::Sync { device, from, to } => {
            let range = match from {
                Some(f) => {
                    let start = parse_range_bound(f)?;
                    let end = match to {
                        Some(t) => parse_range_bound(t)?,
                        None => Utc::now(),
                    };
                    Some((start, end))
                }
                None => None,
            };

            let mut pool = super::open_pool(cfg)?;
            let run = sync_device(&mut pool, cfg, device, range)?;
            report(&run);

            if run.status == RunStatus::Failed {
                return Err(AppError::Other(format!("sync of '{device}' failed")));
            }
        }
        Commands::SyncAll => {
            // workers open their own connections; make sure the schema exists first
            drop(super::open_pool(cfg)?);

            let runs = sync_all(cfg);
            if runs.is_empty() {
                warning("No enabled devices configured.");
                return Ok(());
            }
            for run in &runs {
                report(run);
            }
            println!();
            print!("{}", runs_table(&runs).render());

            let failed = runs.iter().filter(|r| r.status == RunStatus::Failed).count();
            if failed > 0 {
                return Err(AppError::Other(format!(
                    "{failed} of {} device syncs failed",
                    runs.len()
                )));
            }
        }
        _ => {}
    }
    Ok(())
}
