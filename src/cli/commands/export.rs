use crate::cli::parser::Commands;
use crate::config::Config;
use crate::errors::AppResult;
use crate::export::ExportLogic;

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Export {
        format,
        file,
        employee,
        force,
    } = cmd
    {
        let mut pool = super::open_pool(cfg)?;
        ExportLogic::export(&mut pool, *format, file, *employee, *force)?;
    }
    Ok(())
}
