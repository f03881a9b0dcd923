use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::report::print_events;
use crate::errors::AppResult;

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Events { employee } = cmd {
        let mut pool = super::open_pool(cfg)?;
        print_events(&mut pool, *employee)?;
    }
    Ok(())
}
