use crate::cli::parser::{Commands, EmployeeAction};
use crate::config::Config;
use crate::core::report::print_employees;
use crate::db::log::ttlog;
use crate::db::queries::{find_employee_by_device_code, insert_employee};
use crate::errors::{AppError, AppResult};
use crate::ui::messages::success;

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Employee { action } = cmd else {
        return Ok(());
    };
    let mut pool = super::open_pool(cfg)?;

    match action {
        EmployeeAction::Add {
            name,
            code,
            barcode,
            namespace,
        } => {
            if code.is_none() && barcode.is_none() {
                return Err(AppError::Parse("employee needs --code or --barcode".into()));
            }
            if let Some(c) = code {
                if find_employee_by_device_code(&pool.conn, namespace, c)?.is_some() {
                    return Err(AppError::Other(format!(
                        "code '{c}' is already used in namespace '{namespace}'"
                    )));
                }
            }

            let id = insert_employee(&pool.conn, namespace, code.as_deref(), barcode.as_deref(), name)?;
            ttlog(
                &pool.conn,
                "employee_add",
                &format!("{namespace}/{}", code.as_deref().or(barcode.as_deref()).unwrap_or("")),
                &format!("Added '{name}' (id {id})"),
            )?;
            success(format!("Employee '{name}' added with id {id}"));
        }
        EmployeeAction::List => print_employees(&mut pool)?,
    }
    Ok(())
}
