//! Device adapters.
//!
//! An adapter turns a time range and a page number into one page of
//! vendor-shaped JSON. It knows nothing about employees or sessions; the
//! normalizer and the reconciler take it from there.

pub mod isapi;
pub mod zkteco;

use crate::config::{Config, DeviceConfig, DeviceKind};
use crate::errors::AppResult;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Failure at the page-fetch boundary. Never fatal to the orchestrator.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("device rejected credentials (401)")]
    Unauthorized,

    #[error("device answered HTTP {0}: {1}")]
    Status(u16, String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for AdapterError {
    fn from(e: std::io::Error) -> Self {
        AdapterError::Connect(e.to_string())
    }
}

/// Request body shape. Firmwares disagree on what they accept, so each
/// adapter lists the shapes it tries, in order, for every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestVariant {
    /// ISAPI `AcsEventCond` restricted to access-control events (`major: 0`).
    AcsEventCond,
    /// ISAPI `AcsEventCond` without `major`; some firmwares reject the field.
    AcsEventCondAllMajors,
    /// HikCentral-style flat `pageNo`/`pageSize` query.
    PagedQuery,
    /// Vendor binary protocol; no body variants.
    Native,
}

impl RequestVariant {
    pub fn name(&self) -> &'static str {
        match self {
            RequestVariant::AcsEventCond => "AcsEventCond",
            RequestVariant::AcsEventCondAllMajors => "AcsEventCond(all majors)",
            RequestVariant::PagedQuery => "PagedQuery",
            RequestVariant::Native => "native",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    /// 1-based
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1) * self.page_size
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub payload: Value,
    /// `Some(false)` when the device says this was the last page.
    pub more: Option<bool>,
}

impl FetchedPage {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            more: None,
        }
    }
}

pub trait DeviceAdapter: Send {
    fn device_id(&self) -> &str;

    fn request_variants(&self) -> &[RequestVariant];

    fn fetch_page(
        &mut self,
        req: &PageRequest,
        variant: RequestVariant,
    ) -> Result<FetchedPage, AdapterError>;
}

/// Build the adapter for a configured device.
pub fn build_adapter(cfg: &Config, device: &DeviceConfig) -> AppResult<Box<dyn DeviceAdapter>> {
    device.validate()?;
    match device.kind {
        DeviceKind::Isapi => Ok(Box::new(isapi::IsapiAdapter::from_config(cfg, device)?)),
        DeviceKind::Zkteco => Ok(Box::new(zkteco::ZkAdapter::from_config(cfg, device)?)),
    }
}
