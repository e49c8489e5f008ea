use rand::RngCore;
use std::collections::HashMap;
use std::sync::Mutex;

pub const DEVICE_COOKIE_NAME: &str = "device_id";
pub const DEVICE_COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 365; // 1 year

/// Opaque per-browser token. Empty means "no stable device identity"
/// (storage unavailable); callers must treat that as a degraded mode,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the device cookie lives. Browser-backed in the real client,
/// in-memory in tests and non-browser contexts.
pub trait CookieStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str, attributes: &str);
    fn remove(&self, name: &str);
}

#[derive(Default)]
pub struct MemoryCookieStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for MemoryCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        self.values.lock().unwrap().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str, _attributes: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    fn remove(&self, name: &str) {
        self.values.lock().unwrap().remove(name);
    }
}

/// Stable per-client identifier. Generated once, reused for every later
/// session; only an explicit clear() regenerates it.
pub struct DeviceIdentity {
    store: Option<Box<dyn CookieStore>>,
}

impl DeviceIdentity {
    pub fn new(store: Box<dyn CookieStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Non-browser execution context: no persistence available.
    pub fn detached() -> Self {
        Self { store: None }
    }

    pub fn get_or_create(&self) -> DeviceId {
        let Some(store) = self.store.as_ref() else {
            return DeviceId::empty();
        };

        if let Some(existing) = store.get(DEVICE_COOKIE_NAME) {
            if !existing.is_empty() {
                return DeviceId(existing);
            }
        }

        let token = generate_token();
        store.set(DEVICE_COOKIE_NAME, &token, &cookie_attributes());
        DeviceId(token)
    }

    pub fn clear(&self) {
        if let Some(store) = self.store.as_ref() {
            store.remove(DEVICE_COOKIE_NAME);
        }
    }
}

/// 128-bit random hex token; collision odds are negligible for any realistic
/// device population.
fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn cookie_attributes() -> String {
    format!("Path=/; Max-Age={DEVICE_COOKIE_MAX_AGE_SECS}; Secure; SameSite=Lax")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_across_reads() {
        let identity = DeviceIdentity::new(Box::new(MemoryCookieStore::new()));

        let first = identity.get_or_create();
        let second = identity.get_or_create();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn clear_forces_a_new_token() {
        let identity = DeviceIdentity::new(Box::new(MemoryCookieStore::new()));

        let first = identity.get_or_create();
        identity.clear();
        let second = identity.get_or_create();

        assert_ne!(first, second);
    }

    #[test]
    fn detached_context_yields_empty_identity() {
        let identity = DeviceIdentity::detached();
        assert!(identity.get_or_create().is_empty());
        identity.clear(); // must not panic
    }

    #[test]
    fn tokens_are_128_bit_hex() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
