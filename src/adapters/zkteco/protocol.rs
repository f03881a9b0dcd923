//! ZKTeco terminal protocol over TCP.
//!
//! Frame: `50 50 82 7d` + u32 LE length, then the packet:
//! `command u16 | checksum u16 | session u16 | reply u16 | data`.

use crate::adapters::AdapterError;
use chrono::{NaiveDate, NaiveDateTime};
use std::io::{Read, Write};
use tracing::{debug, warn};

pub const CMD_CONNECT: u16 = 1000;
pub const CMD_EXIT: u16 = 1001;
pub const CMD_AUTH: u16 = 1102;
pub const CMD_ATTLOG_RRQ: u16 = 13;
pub const CMD_USERTEMP_RRQ: u16 = 9;
pub const CMD_GET_FREE_SIZES: u16 = 50;
pub const CMD_PREPARE_DATA: u16 = 1500;
pub const CMD_DATA: u16 = 1501;
pub const CMD_FREE_DATA: u16 = 1502;
pub const CMD_ACK_OK: u16 = 2000;
pub const CMD_ACK_ERROR: u16 = 2001;
pub const CMD_ACK_DATA: u16 = 2002;
pub const CMD_ACK_UNAUTH: u16 = 2005;

const FCT_USER: u8 = 5;
const USHRT_MAX: i64 = 65535;
const TCP_MAGIC: [u8; 4] = [0x50, 0x50, 0x82, 0x7d];
const MAX_FRAME: usize = 16 * 1024 * 1024;
/// Largest bulk transfer a terminal may announce in `CMD_PREPARE_DATA`.
const MAX_BULK_SIZE: usize = 64 * 1024 * 1024;

/// One decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub command: u16,
    pub session_id: u16,
    pub reply_id: u16,
    pub data: Vec<u8>,
}

/// Terminal checksum: ones-complement style sum of LE words.
pub fn checksum(buf: &[u8]) -> u16 {
    let mut sum: i64 = 0;
    let mut chunks = buf.chunks_exact(2);
    for pair in &mut chunks {
        sum += i64::from(u16::from_le_bytes([pair[0], pair[1]]));
        if sum > USHRT_MAX {
            sum -= USHRT_MAX;
        }
    }
    if let Some(last) = chunks.remainder().first() {
        sum += i64::from(*last);
    }
    while sum > USHRT_MAX {
        sum -= USHRT_MAX;
    }

    sum = -sum - 1;
    while sum < 0 {
        sum += USHRT_MAX;
    }
    sum as u16
}

pub fn encode_packet(command: u16, session_id: u16, reply_id: u16, data: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(8 + data.len());
    packet.extend_from_slice(&command.to_le_bytes());
    packet.extend_from_slice(&0u16.to_le_bytes());
    packet.extend_from_slice(&session_id.to_le_bytes());
    packet.extend_from_slice(&reply_id.to_le_bytes());
    packet.extend_from_slice(data);

    let sum = checksum(&packet);
    packet[2..4].copy_from_slice(&sum.to_le_bytes());

    let mut frame = Vec::with_capacity(8 + packet.len());
    frame.extend_from_slice(&TCP_MAGIC);
    frame.extend_from_slice(&(packet.len() as u32).to_le_bytes());
    frame.extend_from_slice(&packet);
    frame
}

pub fn read_packet<R: Read>(stream: &mut R) -> Result<Packet, AdapterError> {
    let mut top = [0u8; 8];
    stream.read_exact(&mut top)?;
    if top[..4] != TCP_MAGIC {
        return Err(AdapterError::Protocol("bad frame magic".into()));
    }

    let len = u32::from_le_bytes([top[4], top[5], top[6], top[7]]) as usize;
    if !(8..=MAX_FRAME).contains(&len) {
        return Err(AdapterError::Protocol(format!("bad frame length {len}")));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;

    Ok(Packet {
        command: u16::from_le_bytes([buf[0], buf[1]]),
        session_id: u16::from_le_bytes([buf[4], buf[5]]),
        reply_id: u16::from_le_bytes([buf[6], buf[7]]),
        data: buf[8..].to_vec(),
    })
}

/// Comm key scrambling used by `CMD_AUTH`.
pub fn make_commkey(key: u32, session_id: u16, ticks: u8) -> [u8; 4] {
    let mut k: u32 = 0;
    for i in 0..32 {
        k = if key & (1 << i) != 0 { (k << 1) | 1 } else { k << 1 };
    }
    let k = k.wrapping_add(u32::from(session_id)).to_le_bytes();

    let x = [k[0] ^ b'Z', k[1] ^ b'K', k[2] ^ b'S', k[3] ^ b'O'];
    // swap the two u16 halves
    let s = [x[2], x[3], x[0], x[1]];

    [s[0] ^ ticks, s[1] ^ ticks, ticks, s[3] ^ ticks]
}

/// Terminal timestamp: packed seconds since 2000-01-01 with 31-day months.
pub fn decode_time(mut t: u32) -> Option<NaiveDateTime> {
    let second = t % 60;
    t /= 60;
    let minute = t % 60;
    t /= 60;
    let hour = t % 24;
    t /= 24;
    let day = t % 31 + 1;
    t /= 31;
    let month = t % 12 + 1;
    t /= 12;
    let year = t as i32 + 2000;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

pub fn encode_time(dt: &NaiveDateTime) -> u32 {
    use chrono::{Datelike, Timelike};
    let d = ((dt.year() as u32 - 2000) * 12 * 31 + (dt.month() - 1) * 31 + dt.day() - 1)
        * (24 * 60 * 60);
    d + (dt.hour() * 60 + dt.minute()) * 60 + dt.second()
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn u16_at(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub uid: u16,
    pub user_id: String,
    pub status: u8,
    pub punch: u8,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub uid: u16,
    pub user_id: String,
    pub name: String,
}

fn record_size(body_len: usize, count: Option<u32>, candidates: &[usize]) -> Option<usize> {
    if let Some(n) = count.filter(|n| *n > 0) {
        let size = body_len / n as usize;
        if size > 0 && body_len % n as usize == 0 && candidates.contains(&size) {
            return Some(size);
        }
    }
    candidates.iter().copied().find(|s| body_len % s == 0)
}

/// Split an attendance buffer (u32 total size + records) into records.
/// `count` is the record count reported by `CMD_GET_FREE_SIZES`, if known.
pub fn parse_attendance(buf: &[u8], count: Option<u32>) -> Vec<AttendanceRecord> {
    if buf.len() < 4 {
        return Vec::new();
    }
    let body = &buf[4..];
    let Some(size) = record_size(body.len(), count, &[40, 16, 8]) else {
        warn!(len = body.len(), "attendance buffer has no known record size");
        return Vec::new();
    };

    let mut out = Vec::new();
    for rec in body.chunks_exact(size) {
        let (uid, user_id, status, raw_time, punch) = match size {
            40 => (u16_at(rec, 0), c_string(&rec[2..26]), rec[26], u32_at(rec, 27), rec[31]),
            16 => {
                let id = u32_at(rec, 0);
                (0, id.to_string(), rec[8], u32_at(rec, 4), rec[9])
            }
            _ => {
                let uid = u16_at(rec, 0);
                (uid, uid.to_string(), rec[2], u32_at(rec, 3), rec[7])
            }
        };

        match decode_time(raw_time) {
            Some(timestamp) => out.push(AttendanceRecord {
                uid,
                user_id,
                status,
                punch,
                timestamp,
            }),
            None => warn!(raw_time, "skipping attendance record with invalid time"),
        }
    }
    out
}

/// Split a user table buffer (u32 total size + records) into users.
pub fn parse_users(buf: &[u8], count: Option<u32>) -> Vec<UserRecord> {
    if buf.len() < 4 {
        return Vec::new();
    }
    let body = &buf[4..];
    let Some(size) = record_size(body.len(), count, &[72, 28]) else {
        return Vec::new();
    };

    body.chunks_exact(size)
        .map(|rec| match size {
            72 => UserRecord {
                uid: u16_at(rec, 0),
                name: c_string(&rec[11..35]),
                user_id: c_string(&rec[48..72]),
            },
            _ => UserRecord {
                uid: u16_at(rec, 0),
                name: c_string(&rec[8..16]),
                user_id: u32_at(rec, 24).to_string(),
            },
        })
        .collect()
}

/// Record counts reported by `CMD_GET_FREE_SIZES`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sizes {
    pub users: u32,
    pub records: u32,
}

/// Connected terminal session. Dropping it sends `CMD_EXIT`, so the device is
/// released on every exit path.
pub struct ZkSession<S: Read + Write> {
    stream: S,
    session_id: u16,
    reply_id: u16,
}

impl<S: Read + Write> ZkSession<S> {
    pub fn connect(stream: S, comm_key: u32) -> Result<Self, AdapterError> {
        let mut session = Self {
            stream,
            session_id: 0,
            reply_id: (USHRT_MAX - 1) as u16,
        };

        let resp = session.command(CMD_CONNECT, &[])?;
        session.session_id = resp.session_id;

        match resp.command {
            CMD_ACK_OK => {}
            CMD_ACK_UNAUTH => {
                let key = make_commkey(comm_key, session.session_id, 50);
                let auth = session.command(CMD_AUTH, &key)?;
                if auth.command != CMD_ACK_OK {
                    return Err(AdapterError::Unauthorized);
                }
            }
            other => {
                return Err(AdapterError::Protocol(format!(
                    "unexpected reply {other} to CMD_CONNECT"
                )));
            }
        }

        debug!(session = session.session_id, "terminal connected");
        Ok(session)
    }

    fn next_reply_id(&mut self) -> u16 {
        let next = (i64::from(self.reply_id) + 1) % USHRT_MAX;
        self.reply_id = next as u16;
        self.reply_id
    }

    fn send(&mut self, command: u16, data: &[u8]) -> Result<(), AdapterError> {
        let reply_id = self.next_reply_id();
        let frame = encode_packet(command, self.session_id, reply_id, data);
        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Packet, AdapterError> {
        let packet = read_packet(&mut self.stream)?;
        self.reply_id = packet.reply_id;
        Ok(packet)
    }

    pub fn command(&mut self, command: u16, data: &[u8]) -> Result<Packet, AdapterError> {
        self.send(command, data)?;
        self.recv()
    }

    /// Legacy bulk read: the reply is either the data itself or
    /// `CMD_PREPARE_DATA` followed by `CMD_DATA` chunks and a final ack.
    pub fn read_bulk(&mut self, command: u16, data: &[u8]) -> Result<Vec<u8>, AdapterError> {
        let first = self.command(command, data)?;

        let buf = match first.command {
            CMD_DATA => first.data,
            CMD_ACK_OK | CMD_ACK_DATA if first.data.is_empty() => Vec::new(),
            CMD_PREPARE_DATA => {
                if first.data.len() < 4 {
                    return Err(AdapterError::Protocol("short CMD_PREPARE_DATA".into()));
                }
                let size = u32_at(&first.data, 0) as usize;
                if size > MAX_BULK_SIZE {
                    return Err(AdapterError::Protocol(format!(
                        "announced data size {size} exceeds {MAX_BULK_SIZE} bytes"
                    )));
                }
                let mut buf = Vec::with_capacity(size);
                let mut acked = false;
                while buf.len() < size {
                    let chunk = self.recv()?;
                    match chunk.command {
                        CMD_DATA => buf.extend_from_slice(&chunk.data),
                        CMD_ACK_OK => {
                            acked = true;
                            break;
                        }
                        other => {
                            return Err(AdapterError::Protocol(format!(
                                "unexpected reply {other} while reading data"
                            )));
                        }
                    }
                }
                // trailing ack after the last chunk
                if !acked {
                    let tail = self.recv()?;
                    if tail.command != CMD_ACK_OK {
                        warn!(command = tail.command, "missing ack after bulk read");
                    }
                }
                buf
            }
            CMD_ACK_ERROR => {
                return Err(AdapterError::Protocol(format!("device refused command {command}")));
            }
            other => {
                return Err(AdapterError::Protocol(format!(
                    "unexpected reply {other} to command {command}"
                )));
            }
        };

        self.command(CMD_FREE_DATA, &[])?;
        Ok(buf)
    }

    pub fn read_sizes(&mut self) -> Result<Sizes, AdapterError> {
        let resp = self.command(CMD_GET_FREE_SIZES, &[])?;
        if resp.command != CMD_ACK_OK || resp.data.len() < 80 {
            return Ok(Sizes::default());
        }
        let field = |i: usize| u32_at(&resp.data, i * 4);
        Ok(Sizes {
            users: field(4),
            records: field(8),
        })
    }

    pub fn get_attendance(&mut self, records: Option<u32>) -> Result<Vec<AttendanceRecord>, AdapterError> {
        let buf = self.read_bulk(CMD_ATTLOG_RRQ, &[])?;
        Ok(parse_attendance(&buf, records))
    }

    pub fn get_users(&mut self, users: Option<u32>) -> Result<Vec<UserRecord>, AdapterError> {
        let buf = self.read_bulk(CMD_USERTEMP_RRQ, &[FCT_USER])?;
        Ok(parse_users(&buf, users))
    }
}

impl<S: Read + Write> Drop for ZkSession<S> {
    fn drop(&mut self) {
        if let Err(e) = self.send(CMD_EXIT, &[]) {
            debug!("disconnect failed: {e}");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Scripted terminal: replays queued frames and records what was sent.
    pub struct ScriptedStream {
        pub inbound: VecDeque<u8>,
        pub outbound: Arc<Mutex<Vec<u8>>>,
    }

    impl ScriptedStream {
        pub fn new(replies: &[Vec<u8>]) -> Self {
            Self {
                inbound: replies.iter().flatten().copied().collect(),
                outbound: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    /// Commands found in a captured outbound byte stream, in order.
    pub fn sent_commands(bytes: &[u8]) -> Vec<u16> {
        let mut cursor = io::Cursor::new(bytes);
        let mut out = Vec::new();
        while let Ok(p) = read_packet(&mut cursor) {
            out.push(p.command);
        }
        out
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.inbound.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.inbound.pop_front().unwrap_or(0);
            }
            Ok(n)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbound.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub fn reply(command: u16, data: &[u8]) -> Vec<u8> {
        encode_packet(command, 7, 1, data)
    }

    pub fn attendance_record(user_id: &str, dt: &NaiveDateTime, status: u8, punch: u8) -> Vec<u8> {
        let mut rec = vec![0u8; 40];
        rec[0..2].copy_from_slice(&1u16.to_le_bytes());
        rec[2..2 + user_id.len()].copy_from_slice(user_id.as_bytes());
        rec[26] = status;
        rec[27..31].copy_from_slice(&encode_time(dt).to_le_bytes());
        rec[31] = punch;
        rec
    }

    pub fn with_size_prefix(records: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = records.iter().flatten().copied().collect();
        let mut buf = (body.len() as u32).to_le_bytes().to_vec();
        buf.extend(body);
        buf
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn checksum_of_connect_header_matches_terminal() {
        // CMD_CONNECT, session 0, reply 65534 → the bytes pyzk-compatible terminals expect
        let frame = encode_packet(CMD_CONNECT, 0, 65534, &[]);
        assert_eq!(&frame[..8], &[0x50, 0x50, 0x82, 0x7d, 8, 0, 0, 0]);
        assert_eq!(&frame[8..], &[0xe8, 0x03, 0x17, 0xfc, 0x00, 0x00, 0xfe, 0xff]);
    }

    #[test]
    fn time_round_trips_through_packed_form() {
        let t = dt("2024-05-01 08:30:15");
        assert_eq!(decode_time(encode_time(&t)), Some(t));
    }

    #[test]
    fn reads_attendance_through_prepare_data() {
        let recs = vec![
            attendance_record("1001", &dt("2024-05-01 08:00:00"), 1, 0),
            attendance_record("1002", &dt("2024-05-01 08:05:00"), 15, 1),
        ];
        let buf = with_size_prefix(&recs);
        let (a, b) = buf.split_at(30);

        let stream = ScriptedStream::new(&[
            reply(CMD_ACK_OK, &[]),
            reply(CMD_PREPARE_DATA, &(buf.len() as u32).to_le_bytes()),
            reply(CMD_DATA, a),
            reply(CMD_DATA, b),
            reply(CMD_ACK_OK, &[]),
            reply(CMD_ACK_OK, &[]), // free data
        ]);

        let mut session = ZkSession::connect(stream, 0).unwrap();
        let out = session.get_attendance(Some(2)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].user_id, "1001");
        assert_eq!(out[1].punch, 1);
        assert_eq!(out[1].status, 15);
        assert_eq!(out[1].timestamp, dt("2024-05-01 08:05:00"));
    }

    #[test]
    fn oversized_bulk_announcement_is_rejected() {
        let stream = ScriptedStream::new(&[
            reply(CMD_ACK_OK, &[]),
            reply(CMD_PREPARE_DATA, &u32::MAX.to_le_bytes()),
        ]);
        let sent = stream.outbound.clone();

        let mut session = ZkSession::connect(stream, 0).unwrap();
        match session.get_attendance(None) {
            Err(AdapterError::Protocol(msg)) => assert!(msg.contains("exceeds")),
            other => panic!("expected a protocol error, got {other:?}"),
        }
        drop(session);
        assert_eq!(
            sent_commands(&sent.lock().unwrap()),
            vec![CMD_CONNECT, CMD_ATTLOG_RRQ, CMD_EXIT]
        );
    }

    #[test]
    fn drop_sends_exit() {
        let stream = ScriptedStream::new(&[reply(CMD_ACK_OK, &[])]);
        let sent = stream.outbound.clone();
        let session = ZkSession::connect(stream, 0).unwrap();
        drop(session);
        assert_eq!(sent_commands(&sent.lock().unwrap()), vec![CMD_CONNECT, CMD_EXIT]);
    }

    #[test]
    fn rejected_comm_key_is_unauthorized_and_still_disconnects() {
        let stream = ScriptedStream::new(&[reply(CMD_ACK_UNAUTH, &[]), reply(CMD_ACK_ERROR, &[])]);
        let sent = stream.outbound.clone();
        assert!(matches!(
            ZkSession::connect(stream, 1234),
            Err(AdapterError::Unauthorized)
        ));
        assert_eq!(
            sent_commands(&sent.lock().unwrap()),
            vec![CMD_CONNECT, CMD_AUTH, CMD_EXIT]
        );
    }

    #[test]
    fn users_parse_from_72_byte_records() {
        let mut rec = vec![0u8; 72];
        rec[0..2].copy_from_slice(&3u16.to_le_bytes());
        rec[11..16].copy_from_slice(b"Alice");
        rec[48..52].copy_from_slice(b"1001");
        let users = parse_users(&with_size_prefix(&[rec]), Some(1));
        assert_eq!(users[0].name, "Alice");
        assert_eq!(users[0].user_id, "1001");
    }
}
