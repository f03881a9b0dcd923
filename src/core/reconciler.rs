//! Folds accepted punches into check-in/check-out sessions.
//!
//! Per employee there are two states: CLOSED (no open session) and OPEN.
//!
//! | event     | CLOSED        | OPEN                          |
//! |-----------|---------------|-------------------------------|
//! | `in`      | open session  | open another session          |
//! | `out`     | skip (orphan) | close the chosen session      |
//! | `unknown` | open session  | close the chosen session      |
//!
//! An `unknown` event at the very instant the chosen session was opened
//! is skipped instead of producing a zero-length session. A closing event
//! earlier than the chosen session's check-in is skipped as out of order;
//! the session stays open.

use crate::core::dedup;
use crate::db::queries::{close_session, find_open_session, insert_device_event, insert_session};
use crate::errors::AppResult;
use crate::models::punch_hint::PunchHint;
use crate::models::raw_event::RawEvent;
use crate::models::session::CloseOrder;
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// New session id.
    Opened(i64),
    /// Closed session id.
    Closed(i64),
    /// `unknown` event equal to the open session's check-in.
    SelfPaired,
    /// Closing event older than the open session's check-in.
    OutOfOrder,
    /// `out` with nothing open.
    OrphanOut,
}

impl Outcome {
    /// Whether the ledger changed.
    pub fn is_created(&self) -> bool {
        matches!(self, Outcome::Opened(_) | Outcome::Closed(_))
    }
}

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Duplicate,
    Reconciled(Outcome),
}

impl Applied {
    pub fn is_created(&self) -> bool {
        matches!(self, Applied::Reconciled(o) if o.is_created())
    }
}

/// Session transition for one event. Reads the open session on `conn`, which
/// must be the transaction the caller writes in.
pub fn reconcile(
    conn: &Connection,
    employee_id: i64,
    event: &RawEvent,
    source_device: &str,
    order: CloseOrder,
) -> AppResult<Outcome> {
    let open = find_open_session(conn, employee_id, order)?;
    let ts = &event.timestamp;

    let outcome = match (event.punch_hint, open) {
        (PunchHint::In, _) | (PunchHint::Unknown, None) => {
            Outcome::Opened(insert_session(conn, employee_id, ts, source_device)?)
        }
        (PunchHint::Unknown, Some(s)) if s.check_in == *ts => Outcome::SelfPaired,
        (PunchHint::Out | PunchHint::Unknown, Some(s)) if *ts < s.check_in => {
            warn!(
                employee_id,
                at = %ts,
                check_in = %s.check_in,
                session = s.id,
                "punch precedes the open session's check-in, skipped"
            );
            Outcome::OutOfOrder
        }
        (PunchHint::Out | PunchHint::Unknown, Some(s)) => {
            close_session(conn, s.id, ts)?;
            Outcome::Closed(s.id)
        }
        (PunchHint::Out, None) => {
            warn!(employee_id, at = %ts, "check-out without an open session ignored");
            Outcome::OrphanOut
        }
    };

    debug!(employee_id, at = %ts, hint = event.punch_hint.to_db_str(), ?outcome, "event reconciled");
    Ok(outcome)
}

/// Dedup check, ledger insert and session transition in one
/// `BEGIN IMMEDIATE` transaction.
pub fn apply_event(
    conn: &mut Connection,
    employee_id: i64,
    event: &RawEvent,
    source_device: &str,
    order: CloseOrder,
) -> AppResult<Applied> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // nothing written yet; dropping tx rolls back
    if !dedup::accept(&tx, employee_id, &event.timestamp)? {
        return Ok(Applied::Duplicate);
    }

    insert_device_event(&tx, employee_id, event, source_device)?;
    let outcome = reconcile(&tx, employee_id, event, source_device, order)?;
    tx.commit()?;

    Ok(Applied::Reconciled(outcome))
}
