//! Maps device employee codes to ledger employees.

use crate::config::UnknownEmployeePolicy;
use crate::db::log::ttlog;
use crate::db::queries::{
    find_employee_by_barcode, find_employee_by_device_code, insert_placeholder_employee,
};
use crate::errors::{AppError, AppResult};
use crate::models::employee::{Employee, placeholder_name};
use crate::models::raw_event::RawEvent;
use rusqlite::Connection;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(Employee),
    Provisioned(Employee),
    Unknown,
}

impl Resolution {
    pub fn employee(&self) -> Option<&Employee> {
        match self {
            Resolution::Found(e) | Resolution::Provisioned(e) => Some(e),
            Resolution::Unknown => None,
        }
    }
}

/// Resolve by `device_code`, then `barcode`. On a miss either provision a
/// placeholder or report `Unknown`, depending on `policy`.
///
/// Placeholder creation is an insert-or-ignore on the unique
/// `(namespace, device_code)` index followed by a re-read, so concurrent
/// resolutions of the same code end up on a single row.
pub fn resolve(
    conn: &Connection,
    namespace: &str,
    event: &RawEvent,
    policy: UnknownEmployeePolicy,
) -> AppResult<Resolution> {
    let code = event.device_employee_code.as_str();

    if let Some(emp) = find_employee_by_device_code(conn, namespace, code)? {
        return Ok(Resolution::Found(emp));
    }
    if let Some(emp) = find_employee_by_barcode(conn, namespace, code)? {
        return Ok(Resolution::Found(emp));
    }

    if policy == UnknownEmployeePolicy::Skip {
        return Ok(Resolution::Unknown);
    }

    let name = event
        .display_name
        .clone()
        .unwrap_or_else(|| placeholder_name(code));

    let created = insert_placeholder_employee(conn, namespace, code, &name)?;
    let emp = find_employee_by_device_code(conn, namespace, code)?.ok_or_else(|| {
        AppError::Other(format!("placeholder for '{namespace}/{code}' vanished after insert"))
    })?;

    if created {
        info!(namespace, code, id = emp.id, "placeholder employee created");
        ttlog(
            conn,
            "employee_provisioned",
            &format!("{namespace}/{code}"),
            &format!("Created placeholder '{}' (id {})", emp.display_name, emp.id),
        )?;
        Ok(Resolution::Provisioned(emp))
    } else {
        Ok(Resolution::Found(emp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate::run_pending_migrations;
    use crate::db::queries::{insert_employee, load_employees};
    use crate::models::punch_hint::PunchHint;
    use crate::utils::time::from_db;

    fn conn() -> Connection {
        let c = Connection::open_in_memory().unwrap();
        run_pending_migrations(&c).unwrap();
        c
    }

    fn event(code: &str) -> RawEvent {
        RawEvent::new(code, from_db("2024-05-01T08:00:00Z").unwrap(), PunchHint::Unknown)
    }

    #[test]
    fn finds_by_code_then_barcode() {
        let c = conn();
        insert_employee(&c, "hq", Some("10"), None, "Ada").unwrap();
        insert_employee(&c, "hq", None, Some("B-1"), "Bob").unwrap();

        let r = resolve(&c, "hq", &event("10"), UnknownEmployeePolicy::Skip).unwrap();
        assert_eq!(r.employee().unwrap().display_name, "Ada");
        let r = resolve(&c, "hq", &event("B-1"), UnknownEmployeePolicy::Skip).unwrap();
        assert_eq!(r.employee().unwrap().display_name, "Bob");
    }

    #[test]
    fn namespaces_are_separate() {
        let c = conn();
        insert_employee(&c, "hq", Some("10"), None, "Ada").unwrap();
        let r = resolve(&c, "branch", &event("10"), UnknownEmployeePolicy::Skip).unwrap();
        assert_eq!(r, Resolution::Unknown);
    }

    #[test]
    fn provisioning_is_idempotent() {
        let c = conn();
        let mut ev = event("77");
        ev.display_name = Some("Grace".into());

        let first = resolve(&c, "hq", &ev, UnknownEmployeePolicy::Provision).unwrap();
        let second = resolve(&c, "hq", &ev, UnknownEmployeePolicy::Provision).unwrap();

        let Resolution::Provisioned(emp) = first else {
            panic!("expected a placeholder");
        };
        assert!(emp.placeholder);
        assert_eq!(emp.display_name, "Grace");
        assert_eq!(second, Resolution::Found(emp));
        assert_eq!(load_employees(&c).unwrap().len(), 1);
    }

    #[test]
    fn placeholder_name_falls_back_to_code() {
        let c = conn();
        let r = resolve(&c, "hq", &event("9"), UnknownEmployeePolicy::Provision).unwrap();
        assert_eq!(r.employee().unwrap().display_name, "Device User 9");
    }
}
