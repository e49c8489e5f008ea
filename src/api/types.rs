use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_id: String,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

/// Either one device or everything; `{all: true}` wins when both are set.
#[derive(Debug, Deserialize)]
pub struct DeleteDeviceRequest {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceCountResponse {
    pub device_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct AdminLogoutRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct AdminLogoutResponse {
    pub user_id: String,
    pub devices_removed: usize,
    pub tokens_invalidated: bool,
}
