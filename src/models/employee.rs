use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Employee {
    pub id: i64,
    pub namespace: String,     // ⇔ employees.namespace (device namespace)
    pub device_code: Option<String>,
    pub barcode: Option<String>, // secondary identification field
    pub display_name: String,
    pub placeholder: bool,     // created by auto-provisioning
    pub created_at: String,
}

pub const DEFAULT_NAMESPACE: &str = "default";

/// Name given to auto-provisioned employees when the payload carries none.
pub fn placeholder_name(code: &str) -> String {
    format!("Device User {code}")
}
