use crate::errors::{AppError, AppResult};
use crate::models::employee::DEFAULT_NAMESPACE;
use crate::models::session::CloseOrder;
use crate::utils::time::parse_utc_offset;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Isapi,
    Zkteco,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Basic,
    Token,
}

/// What to do with a device code that matches no employee.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownEmployeePolicy {
    Provision,
    #[default]
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub kind: DeviceKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_namespace")]
    pub namespace: String,

    // ISAPI
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
    #[serde(default)]
    pub auth_mode: AuthMode,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub app_key: Option<String>,
    #[serde(default)]
    pub app_secret: Option<String>,

    // ZKTeco
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_zk_port")]
    pub port: u16,
    #[serde(default)]
    pub comm_key: u32,

    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub unknown_employees: Option<UnknownEmployeePolicy>,
}

impl DeviceConfig {
    pub fn offset(&self) -> AppResult<FixedOffset> {
        parse_utc_offset(&self.timezone)
    }

    /// Reject settings a run cannot start without.
    pub fn validate(&self) -> AppResult<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::Configuration("device id is empty".into()));
        }

        match self.kind {
            DeviceKind::Isapi => {
                let base = self.base_url.as_deref().unwrap_or("").trim();
                if base.is_empty() {
                    return Err(AppError::Configuration(format!(
                        "device '{}': base_url is missing",
                        self.id
                    )));
                }
                if !base.starts_with("http://") && !base.starts_with("https://") {
                    return Err(AppError::Configuration(format!(
                        "device '{}': base_url must start with http:// or https://",
                        self.id
                    )));
                }
                let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
                let creds_ok = match self.auth_mode {
                    AuthMode::Basic => has(&self.username) && has(&self.password),
                    AuthMode::Token => has(&self.app_key) && has(&self.app_secret),
                };
                if !creds_ok {
                    return Err(AppError::Configuration(format!(
                        "device '{}': credentials missing for auth mode {:?}",
                        self.id, self.auth_mode
                    )));
                }
            }
            DeviceKind::Zkteco => {
                if self.host.as_deref().unwrap_or("").trim().is_empty() {
                    return Err(AppError::Configuration(format!(
                        "device '{}': host is missing",
                        self.id
                    )));
                }
            }
        }

        if self.timeout_secs == Some(0) {
            return Err(AppError::Configuration(format!(
                "device '{}': timeout_secs must be at least 1",
                self.id
            )));
        }

        self.offset().map(|_| ())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_overlap_minutes")]
    pub overlap_minutes: i64,
    #[serde(default = "default_initial_lookback_hours")]
    pub initial_lookback_hours: i64,
    #[serde(default)]
    pub close_order: CloseOrder,
    #[serde(default)]
    pub unknown_employees: UnknownEmployeePolicy,
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: i64,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

fn default_database() -> String {
    Config::database_file().to_string_lossy().to_string()
}
fn default_true() -> bool {
    true
}
fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}
fn default_endpoint_path() -> String {
    "/ISAPI/AccessControl/AcsEvent?format=json".to_string()
}
fn default_zk_port() -> u16 {
    4370
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_page_size() -> u32 {
    100
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_max_pages() -> u32 {
    1000
}
fn default_overlap_minutes() -> i64 {
    5
}
fn default_initial_lookback_hours() -> i64 {
    24
}
fn default_lease_ttl_secs() -> i64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Self::with_database(default_database())
    }
}

impl Config {
    pub fn with_database(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            max_pages: default_max_pages(),
            overlap_minutes: default_overlap_minutes(),
            initial_lookback_hours: default_initial_lookback_hours(),
            close_order: CloseOrder::default(),
            unknown_employees: UnknownEmployeePolicy::default(),
            lease_ttl_secs: default_lease_ttl_secs(),
            devices: Vec::new(),
        }
    }

    /// Return the standard configuration directory depending on the platform
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("punchsync")
        } else {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".punchsync")
        }
    }

    /// Return the full path of the config file
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("punchsync.conf")
    }

    /// Return the full path of the SQLite database
    pub fn database_file() -> PathBuf {
        Self::config_dir().join("punchsync.sqlite")
    }

    /// Load configuration from file, or return defaults if not found
    pub fn load_from(path: &Path) -> AppResult<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| AppError::ConfigLoad(format!("{}: {}", path.display(), e)))?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml.as_bytes())?;
        Ok(())
    }

    pub fn device(&self, id: &str) -> AppResult<&DeviceConfig> {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::UnknownDevice(id.to_string()))
    }

    pub fn page_size_for(&self, device: &DeviceConfig) -> u32 {
        device.page_size.unwrap_or(self.page_size).max(1)
    }

    pub fn timeout_for(&self, device: &DeviceConfig) -> u64 {
        device.timeout_secs.unwrap_or(self.timeout_secs).max(1)
    }

    pub fn unknown_policy_for(&self, device: &DeviceConfig) -> UnknownEmployeePolicy {
        device.unknown_employees.unwrap_or(self.unknown_employees)
    }

    /// Initialize configuration and database files
    pub fn init_all(config_path: &Path, custom_db: Option<String>, is_test: bool) -> io::Result<Self> {
        let dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_dir);
        fs::create_dir_all(&dir)?;

        // DB name: user provided or default
        let db_path = if let Some(name) = custom_db {
            let p = Path::new(&name);
            if p.is_absolute() { p.to_path_buf() } else { dir.join(p) }
        } else {
            dir.join("punchsync.sqlite")
        };

        let mut config = if config_path.exists() {
            Self::load_from(config_path).map_err(|e| io::Error::other(e.to_string()))?
        } else {
            Config::default()
        };
        config.database = db_path.to_string_lossy().to_string();

        if !is_test {
            config
                .save_to(config_path)
                .map_err(|e| io::Error::other(e.to_string()))?;
            println!("✅ Config file: {:?}", config_path);
        }

        println!("✅ Database:    {:?}", db_path);
        Ok(config)
    }
}
