use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,          // UUID
    pub user_id: String,     // subject from the access token
    pub device_id: String,   // generated on the client, stable per browser profile
    pub created_ts: i64,
    pub last_active_ts: i64,
    pub meta: Option<serde_json::Value>, // optional device info (browser, OS, model)
}

impl SessionRecord {
    pub fn new(user_id: &str, device_id: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            created_ts: now,
            last_active_ts: now,
            meta: None,
        }
    }
}
