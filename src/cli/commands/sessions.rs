use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::report::print_sessions;
use crate::errors::AppResult;

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Sessions { employee, open } = cmd {
        let mut pool = super::open_pool(cfg)?;
        print_sessions(&mut pool, *employee, *open)?;
    }
    Ok(())
}
