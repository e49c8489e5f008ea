use anyhow::Result;
use rocksdb::{Direction, IteratorMode, Options, DB};

use crate::model::session_record::SessionRecord;

use std::str;

pub struct DBLayer {
    db: DB,
}

impl DBLayer {
    pub fn new(path: &str) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    // ============================================================
    // SESSION RECORDS (one row per user+device)
    // ============================================================
    fn session_key(user_id: &str, device_id: &str) -> String {
        format!("session:{user_id}:{device_id}")
    }

    fn session_prefix(user_id: &str) -> String {
        format!("session:{user_id}:")
    }

    fn device_lookup_key(device_id: &str) -> String {
        format!("device_lookup:{device_id}")
    }

    /// Idempotent upsert keyed on (user_id, device_id). An existing row keeps
    /// its created_ts; last_active_ts is always refreshed and meta is replaced
    /// when the caller sends it.
    pub async fn register_device(
        &self,
        user_id: &str,
        device_id: &str,
        meta: Option<serde_json::Value>,
    ) -> Result<SessionRecord> {
        let key = Self::session_key(user_id, device_id);

        let record = match self.db.get(&key)? {
            Some(val) => {
                let mut existing: SessionRecord = serde_json::from_slice(&val)?;
                existing.last_active_ts = chrono::Utc::now().timestamp();
                if meta.is_some() {
                    existing.meta = meta;
                }
                existing
            }
            None => {
                let mut record = SessionRecord::new(user_id, device_id);
                record.meta = meta;
                record
            }
        };

        self.db.put(&key, serde_json::to_vec(&record)?)?;

        // fast lookup: device → user
        let lookup_key = Self::device_lookup_key(device_id);
        self.db.put(lookup_key, user_id)?;

        Ok(record)
    }

    /// Removes one row. Returns false (still success) when the row was absent,
    /// so concurrent deletes of the same device both come back Ok.
    pub async fn remove_device(&self, user_id: &str, device_id: &str) -> Result<bool> {
        let key = Self::session_key(user_id, device_id);
        let existed = self.db.get(&key)?.is_some();
        self.db.delete(&key)?;
        self.db.delete(Self::device_lookup_key(device_id))?;
        Ok(existed)
    }

    pub async fn remove_all_devices(&self, user_id: &str) -> Result<usize> {
        let devices = self.list_devices_for_user(user_id).await?;

        for device in &devices {
            let key = Self::session_key(&device.user_id, &device.device_id);
            self.db.delete(key)?;
            if !device.device_id.is_empty() {
                self.db.delete(Self::device_lookup_key(&device.device_id))?;
            }
        }

        Ok(devices.len())
    }

    pub async fn count_devices(&self, user_id: &str) -> Result<usize> {
        Ok(self.list_devices_for_user(user_id).await?.len())
    }

    pub async fn list_devices_for_user(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        let prefix = Self::session_prefix(user_id);
        let mut out = Vec::new();

        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (key, val) = item?;
            let k = str::from_utf8(&key)?;
            if !k.starts_with(&prefix) {
                break;
            }
            out.push(serde_json::from_slice(&val)?);
        }
        Ok(out)
    }

    pub async fn find_user_for_device(&self, device_id: &str) -> Result<Option<String>> {
        let key = Self::device_lookup_key(device_id);
        Ok(self
            .db
            .get(key)?
            .map(|v| String::from_utf8_lossy(&v).to_string()))
    }

    /// Heartbeat: refresh last_active_ts. Returns false when no row exists.
    pub async fn touch_device(&self, user_id: &str, device_id: &str) -> Result<bool> {
        let key = Self::session_key(user_id, device_id);
        match self.db.get(&key)? {
            Some(val) => {
                let mut record: SessionRecord = serde_json::from_slice(&val)?;
                record.last_active_ts = chrono::Utc::now().timestamp();
                self.db.put(&key, serde_json::to_vec(&record)?)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
