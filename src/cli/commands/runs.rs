use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::report::print_runs;
use crate::errors::AppResult;

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Runs { device, limit } = cmd {
        let mut pool = super::open_pool(cfg)?;
        print_runs(&mut pool, device.as_deref(), *limit)?;
    }
    Ok(())
}
