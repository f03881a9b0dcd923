use crate::cli::parser::Commands;
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::ui::messages::{error, success, warning};
use std::path::Path;

/// Handle the `config` subcommand
pub fn handle(cmd: &Commands, cfg: &Config, config_path: &Path) -> AppResult<()> {
    if let Commands::Config {
        print_config,
        check,
    } = cmd
    {
        if *print_config {
            println!("📄 Current configuration ({}):\n", config_path.display());
            println!("{}", serde_yaml::to_string(cfg)?);
        }

        if *check {
            check_devices(cfg)?;
        }
    }

    Ok(())
}

fn check_devices(cfg: &Config) -> AppResult<()> {
    if cfg.devices.is_empty() {
        warning("No devices configured.");
        return Ok(());
    }

    let mut invalid = 0;
    for device in &cfg.devices {
        match device.validate() {
            Ok(()) => success(format!("{} ({:?}) ok", device.id, device.kind)),
            Err(e) => {
                invalid += 1;
                error(format!("{}: {e}", device.id));
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    for device in &cfg.devices {
        if !seen.insert(device.id.as_str()) {
            invalid += 1;
            error(format!("duplicate device id '{}'", device.id));
        }
    }

    if invalid > 0 {
        return Err(AppError::Configuration(format!(
            "{invalid} problem(s) found in the device list"
        )));
    }
    Ok(())
}
