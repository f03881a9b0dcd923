//! ZKTeco terminal adapter.
//!
//! The terminal only offers a bulk dump of its attendance log, so the whole
//! log is pulled once per run, filtered to the requested range and then
//! served page by page.

pub mod protocol;

use super::{AdapterError, DeviceAdapter, FetchedPage, PageRequest, RequestVariant};
use crate::config::{Config, DeviceConfig};
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone, Utc};
use protocol::{AttendanceRecord, UserRecord, ZkSession};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{info, warn};

const VARIANTS: &[RequestVariant] = &[RequestVariant::Native];

/// Opens a byte stream to the terminal.
pub trait Connector: Send {
    type Stream: Read + Write;
    fn open(&self) -> Result<Self::Stream, AdapterError>;
}

pub struct TcpConnector {
    addr: String,
    timeout: Duration,
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn open(&self) -> Result<TcpStream, AdapterError> {
        let addrs: Vec<SocketAddr> = self
            .addr
            .to_socket_addrs()
            .map_err(|e| AdapterError::Connect(format!("{}: {e}", self.addr)))?
            .collect();
        let addr = addrs
            .first()
            .ok_or_else(|| AdapterError::Connect(format!("{}: no address", self.addr)))?;

        let stream = TcpStream::connect_timeout(addr, self.timeout).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                AdapterError::Timeout(self.timeout.as_secs())
            } else {
                AdapterError::Connect(e.to_string())
            }
        })?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }
}

pub struct ZkAdapter<C: Connector = TcpConnector> {
    device_id: String,
    connector: C,
    comm_key: u32,
    offset: FixedOffset,
    /// Filtered, sorted log of the current run.
    cache: Option<Vec<Value>>,
}

impl ZkAdapter<TcpConnector> {
    pub fn from_config(cfg: &Config, device: &DeviceConfig) -> AppResult<Self> {
        let host = device
            .host
            .as_deref()
            .ok_or_else(|| AppError::Configuration(format!("device '{}': host is missing", device.id)))?;

        let connector = TcpConnector {
            addr: format!("{}:{}", host.trim(), device.port),
            timeout: Duration::from_secs(cfg.timeout_for(device)),
        };
        Ok(Self::with_connector(&device.id, connector, device.comm_key, device.offset()?))
    }
}

impl<C: Connector> ZkAdapter<C> {
    pub fn with_connector(device_id: &str, connector: C, comm_key: u32, offset: FixedOffset) -> Self {
        Self {
            device_id: device_id.to_string(),
            connector,
            comm_key,
            offset,
            cache: None,
        }
    }

    fn pull(&self) -> Result<(Vec<AttendanceRecord>, Vec<UserRecord>), AdapterError> {
        let stream = self.connector.open()?;
        // dropping the session sends CMD_EXIT
        let mut session = ZkSession::connect(stream, self.comm_key)?;

        let sizes = session.read_sizes()?;
        let records = session.get_attendance(Some(sizes.records))?;
        let users = match session.get_users(Some(sizes.users)) {
            Ok(u) => u,
            Err(e) => {
                // the log alone is enough to sync
                warn!(device = %self.device_id, "user table unavailable: {e}");
                Vec::new()
            }
        };
        Ok((records, users))
    }

    fn to_local(&self, rec: &AttendanceRecord) -> Option<DateTime<Utc>> {
        self.offset
            .from_local_datetime(&rec.timestamp)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn load(&mut self, req: &PageRequest) -> Result<&Vec<Value>, AdapterError> {
        if self.cache.is_none() {
            let (records, users) = self.pull()?;
            let names: HashMap<&str, &str> = users
                .iter()
                .map(|u| (u.user_id.as_str(), u.name.as_str()))
                .collect();
            let by_uid: HashMap<u16, &str> = users.iter().map(|u| (u.uid, u.user_id.as_str())).collect();

            let mut rows: Vec<(DateTime<Utc>, Value)> = records
                .iter()
                .filter_map(|rec| {
                    let ts = self.to_local(rec)?;
                    if ts < req.range_start || ts > req.range_end {
                        return None;
                    }
                    let user_id = if rec.user_id.is_empty() {
                        by_uid.get(&rec.uid).copied().unwrap_or_default().to_string()
                    } else {
                        rec.user_id.clone()
                    };
                    let local = ts.with_timezone(&self.offset);
                    let mut row = json!({
                        "user_id": user_id,
                        "timestamp": local.to_rfc3339_opts(SecondsFormat::Secs, false),
                        "punch": rec.punch,
                        "status": rec.status,
                    });
                    if let Some(name) = names.get(user_id.as_str()).filter(|n| !n.is_empty()) {
                        row["name"] = json!(name);
                    }
                    Some((ts, row))
                })
                .collect();

            rows.sort_by(|a, b| a.0.cmp(&b.0));
            info!(device = %self.device_id, total = records.len(), in_range = rows.len(), "attendance log pulled");
            self.cache = Some(rows.into_iter().map(|(_, v)| v).collect());
        }

        self.cache
            .as_ref()
            .ok_or_else(|| AdapterError::Protocol("attendance cache missing".into()))
    }
}

impl<C: Connector> DeviceAdapter for ZkAdapter<C> {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn request_variants(&self) -> &[RequestVariant] {
        VARIANTS
    }

    fn fetch_page(
        &mut self,
        req: &PageRequest,
        _variant: RequestVariant,
    ) -> Result<FetchedPage, AdapterError> {
        let rows = self.load(req)?;
        let start = (req.offset() as usize).min(rows.len());
        let end = (start + req.page_size as usize).min(rows.len());

        Ok(FetchedPage {
            payload: Value::Array(rows[start..end].to_vec()),
            more: Some(end < rows.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::protocol::tests::{ScriptedStream, attendance_record, reply, with_size_prefix};
    use super::protocol::*;
    use super::*;
    use crate::utils::time::parse_range_bound;
    use chrono::NaiveDateTime;
    use std::sync::Mutex;

    struct OneShot(Mutex<Option<ScriptedStream>>);

    impl Connector for OneShot {
        type Stream = ScriptedStream;
        fn open(&self) -> Result<ScriptedStream, AdapterError> {
            self.0
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| AdapterError::Connect("already used".into()))
        }
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn pulls_once_filters_to_range_and_pages() {
        let recs = vec![
            attendance_record("7", &dt("2024-05-01 09:00:00"), 1, 0),
            attendance_record("7", &dt("2024-04-01 09:00:00"), 1, 0), // out of range
            attendance_record("8", &dt("2024-05-01 08:00:00"), 15, 255),
            attendance_record("7", &dt("2024-05-01 18:00:00"), 1, 1),
        ];
        let buf = with_size_prefix(&recs);
        let stream = ScriptedStream::new(&[
            reply(CMD_ACK_OK, &[]),    // connect
            reply(CMD_ACK_ERROR, &[]), // sizes unsupported
            reply(CMD_DATA, &buf),
            reply(CMD_ACK_OK, &[]),    // free data
            reply(CMD_ACK_ERROR, &[]), // users refused
        ]);

        let plus2 = FixedOffset::east_opt(2 * 3600).unwrap();
        let mut adapter =
            ZkAdapter::with_connector("lobby", OneShot(Mutex::new(Some(stream))), 0, plus2);

        let mut req = PageRequest {
            range_start: parse_range_bound("2024-05-01T00:00:00Z").unwrap(),
            range_end: parse_range_bound("2024-05-02T00:00:00Z").unwrap(),
            page: 1,
            page_size: 2,
        };

        let first = adapter.fetch_page(&req, RequestVariant::Native).unwrap();
        let rows = first.payload.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["user_id"], "8");
        assert_eq!(rows[0]["timestamp"], "2024-05-01T08:00:00+02:00");
        assert_eq!(first.more, Some(true));

        // second page is served from the cache; the connector would fail now
        req.page = 2;
        let second = adapter.fetch_page(&req, RequestVariant::Native).unwrap();
        assert_eq!(second.payload.as_array().unwrap().len(), 1);
        assert_eq!(second.more, Some(false));
    }
}
