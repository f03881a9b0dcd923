//! Hikvision ISAPI adapter (`/ISAPI/AccessControl/AcsEvent`).

use super::{AdapterError, DeviceAdapter, FetchedPage, PageRequest, RequestVariant};
use crate::config::{AuthMode, Config, DeviceConfig};
use crate::errors::{AppError, AppResult};
use crate::utils::time::to_device;
use chrono::FixedOffset;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const SEARCH_ID: &str = "punchsync-1";

const VARIANTS: &[RequestVariant] = &[
    RequestVariant::AcsEventCond,
    RequestVariant::AcsEventCondAllMajors,
    RequestVariant::PagedQuery,
];

#[derive(Debug, Clone)]
enum Credentials {
    Basic { username: String, password: String },
    Token { app_key: String, app_secret: String },
}

pub struct IsapiAdapter {
    device_id: String,
    url: String,
    client: Client,
    credentials: Credentials,
    offset: FixedOffset,
    timeout_secs: u64,
}

impl IsapiAdapter {
    pub fn from_config(cfg: &Config, device: &DeviceConfig) -> AppResult<Self> {
        let base = device
            .base_url
            .as_deref()
            .ok_or_else(|| AppError::Configuration(format!("device '{}': base_url is missing", device.id)))?
            .trim_end_matches('/');
        let path = if device.endpoint_path.starts_with('/') {
            device.endpoint_path.clone()
        } else {
            format!("/{}", device.endpoint_path)
        };

        let credentials = match device.auth_mode {
            AuthMode::Basic => Credentials::Basic {
                username: device.username.clone().unwrap_or_default(),
                password: device.password.clone().unwrap_or_default(),
            },
            AuthMode::Token => Credentials::Token {
                app_key: device.app_key.clone().unwrap_or_default(),
                app_secret: device.app_secret.clone().unwrap_or_default(),
            },
        };

        let timeout_secs = cfg.timeout_for(device);
        // terminals ship self-signed certificates
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            device_id: device.id.clone(),
            url: format!("{base}{path}"),
            client,
            credentials,
            offset: device.offset()?,
            timeout_secs,
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Basic { username, password } => builder.basic_auth(username, Some(password)),
            Credentials::Token {
                app_key,
                app_secret,
            } => builder.header("X-Ca-Key", app_key).bearer_auth(app_secret),
        }
    }
}

/// JSON body for one page in the given request shape.
pub fn build_body(req: &PageRequest, variant: RequestVariant, offset: &FixedOffset) -> Value {
    let start = to_device(&req.range_start, offset);
    let end = to_device(&req.range_end, offset);

    match variant {
        RequestVariant::AcsEventCond => json!({
            "AcsEventCond": {
                "searchID": SEARCH_ID,
                "searchResultPosition": req.offset(),
                "maxResults": req.page_size,
                "major": 0,
                "startTime": start,
                "endTime": end,
            }
        }),
        RequestVariant::AcsEventCondAllMajors => json!({
            "AcsEventCond": {
                "searchID": SEARCH_ID,
                "searchResultPosition": req.offset(),
                "maxResults": req.page_size,
                "startTime": start,
                "endTime": end,
            }
        }),
        RequestVariant::PagedQuery | RequestVariant::Native => json!({
            "pageNo": req.page,
            "pageSize": req.page_size,
            "startTime": start,
            "endTime": end,
        }),
    }
}

/// Read `responseStatusStrg` ("MORE" / "OK" / "NO MATCH") when present.
pub fn more_pages(payload: &Value) -> Option<bool> {
    let status = payload
        .pointer("/AcsEvent/responseStatusStrg")
        .or_else(|| payload.get("responseStatusStrg"))
        .and_then(Value::as_str)?;

    match status {
        "MORE" => Some(true),
        "OK" | "NO MATCH" => Some(false),
        _ => None,
    }
}

fn map_transport_error(e: reqwest::Error, timeout_secs: u64) -> AdapterError {
    if e.is_timeout() {
        AdapterError::Timeout(timeout_secs)
    } else if e.is_decode() {
        AdapterError::Decode(e.to_string())
    } else {
        AdapterError::Connect(e.to_string())
    }
}

impl DeviceAdapter for IsapiAdapter {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn request_variants(&self) -> &[RequestVariant] {
        VARIANTS
    }

    fn fetch_page(
        &mut self,
        req: &PageRequest,
        variant: RequestVariant,
    ) -> Result<FetchedPage, AdapterError> {
        let body = build_body(req, variant, &self.offset);
        debug!(device = %self.device_id, page = req.page, variant = variant.name(), "POST {}", self.url);

        let resp = self
            .authorize(self.client.post(&self.url).json(&body))
            .send()
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AdapterError::Unauthorized);
        }
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            let head: String = text.chars().take(200).collect();
            return Err(AdapterError::Status(status.as_u16(), head));
        }

        let payload: Value = resp
            .json()
            .map_err(|e| AdapterError::Decode(format!("invalid JSON from device: {e}")))?;

        Ok(FetchedPage {
            more: more_pages(&payload),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::parse_range_bound;

    fn req(page: u32) -> PageRequest {
        PageRequest {
            range_start: parse_range_bound("2024-05-01T00:00:00Z").unwrap(),
            range_end: parse_range_bound("2024-05-02T00:00:00Z").unwrap(),
            page,
            page_size: 100,
        }
    }

    #[test]
    fn acs_event_cond_carries_position_and_device_local_times() {
        let plus3 = FixedOffset::east_opt(3 * 3600).unwrap();
        let body = build_body(&req(3), RequestVariant::AcsEventCond, &plus3);
        let cond = &body["AcsEventCond"];
        assert_eq!(cond["searchID"], "punchsync-1");
        assert_eq!(cond["searchResultPosition"], 200);
        assert_eq!(cond["maxResults"], 100);
        assert_eq!(cond["major"], 0);
        assert_eq!(cond["startTime"], "2024-05-01T03:00:00+03:00");
    }

    #[test]
    fn all_majors_variant_omits_major() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let body = build_body(&req(1), RequestVariant::AcsEventCondAllMajors, &utc);
        assert!(body["AcsEventCond"].get("major").is_none());
        let paged = build_body(&req(2), RequestVariant::PagedQuery, &utc);
        assert_eq!(paged["pageNo"], 2);
    }

    #[test]
    fn response_status_drives_more_flag() {
        assert_eq!(
            more_pages(&json!({"AcsEvent": {"responseStatusStrg": "MORE"}})),
            Some(true)
        );
        assert_eq!(
            more_pages(&json!({"AcsEvent": {"responseStatusStrg": "NO MATCH"}})),
            Some(false)
        );
        assert_eq!(more_pages(&json!([])), None);
    }
}
