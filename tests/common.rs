#![allow(dead_code)]
use assert_cmd::{Command, cargo_bin_cmd};
use punchsync::adapters::{AdapterError, DeviceAdapter, FetchedPage, PageRequest, RequestVariant};
use punchsync::config::{Config, DeviceConfig, UnknownEmployeePolicy};
use punchsync::db::initialize::init_db;
use punchsync::db::pool::DbPool;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub fn psync() -> Command {
    cargo_bin_cmd!("punchsync")
}

/// Create a unique test DB path inside the system temp dir and remove any existing file
pub fn setup_test_db(name: &str) -> String {
    let mut path: PathBuf = env::temp_dir();
    path.push(format!("{}_punchsync.sqlite", name));
    let db_path = path.to_string_lossy().to_string();
    for suffix in ["", "-wal", "-shm"] {
        fs::remove_file(format!("{db_path}{suffix}")).ok();
    }
    db_path
}

/// Temp file path that does not exist yet
pub fn temp_out(name: &str, ext: &str) -> String {
    let mut path: PathBuf = env::temp_dir();
    path.push(format!("{}_out.{}", name, ext));
    let p = path.to_string_lossy().to_string();
    fs::remove_file(&p).ok();
    p
}

/// Open (and migrate) a database through the library
pub fn open_db(db_path: &str) -> DbPool {
    let pool = DbPool::new(db_path).expect("open db");
    init_db(&pool.conn).expect("init db");
    pool
}

pub fn isapi_device(id: &str) -> DeviceConfig {
    serde_yaml::from_str(&format!(
        "id: {id}\nkind: isapi\nbase_url: http://127.0.0.1:9\nusername: admin\npassword: secret\n"
    ))
    .expect("device yaml")
}

pub fn test_config(db_path: &str, devices: Vec<DeviceConfig>) -> Config {
    let mut cfg = Config::with_database(db_path);
    cfg.unknown_employees = UnknownEmployeePolicy::Provision;
    cfg.devices = devices;
    cfg
}

/// One ISAPI-style record
pub fn rec(code: &str, time: &str) -> Value {
    json!({"employeeNoString": code, "time": time})
}

pub fn page(records: Vec<Value>) -> FetchedPage {
    FetchedPage::new(json!({ "AcsEvent": records }))
}

pub fn last_page(records: Vec<Value>) -> FetchedPage {
    FetchedPage {
        payload: json!({ "AcsEvent": records }),
        more: Some(false),
    }
}

/// In-memory device: every `fetch_page` call pops the next scripted reply.
/// An exhausted script answers with an empty page.
pub struct ScriptedAdapter {
    pub id: String,
    pub variants: Vec<RequestVariant>,
    pub replies: VecDeque<Result<FetchedPage, AdapterError>>,
    pub calls: Arc<Mutex<Vec<(u32, RequestVariant)>>>,
}

impl ScriptedAdapter {
    pub fn new(id: &str, replies: Vec<Result<FetchedPage, AdapterError>>) -> Self {
        Self {
            id: id.to_string(),
            variants: vec![RequestVariant::AcsEventCond],
            replies: replies.into(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_variants(mut self, variants: &[RequestVariant]) -> Self {
        self.variants = variants.to_vec();
        self
    }
}

impl DeviceAdapter for ScriptedAdapter {
    fn device_id(&self) -> &str {
        &self.id
    }

    fn request_variants(&self) -> &[RequestVariant] {
        &self.variants
    }

    fn fetch_page(
        &mut self,
        req: &PageRequest,
        variant: RequestVariant,
    ) -> Result<FetchedPage, AdapterError> {
        self.calls.lock().unwrap().push((req.page, variant));
        self.replies
            .pop_front()
            .unwrap_or_else(|| Ok(FetchedPage::new(json!([]))))
    }
}
