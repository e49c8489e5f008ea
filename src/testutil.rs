//! Mock collaborators for flow, guard and client tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::client::{DeviceRegistry, RegistryError};
use crate::provider::{
    IdentityProvider, OtpOptions, ProviderError, ProviderResult, ProviderSession, ProviderUser,
    SignOutScope,
};

pub const MOCK_OTP_CODE: &str = "123456";

#[derive(Debug, Clone)]
pub struct MockAccount {
    pub password: String,
    pub verified: bool,
}

#[derive(Default)]
pub struct MockProvider {
    pub accounts: Mutex<HashMap<String, MockAccount>>,
    pub session: Mutex<Option<ProviderSession>>,
    /// (email, create_if_absent) for every OTP dispatch.
    pub otp_dispatches: Mutex<Vec<(String, bool)>>,
    /// Report sign-up success with an empty identity list instead of a
    /// duplicate error (the provider's anti-enumeration mode).
    pub silent_duplicates: AtomicBool,
    pub rate_limited: AtomicBool,
    pub fail_sign_out: AtomicBool,
    pub password_updates: Mutex<Vec<String>>,
    pub admin_revocations: Mutex<Vec<String>>,
    pub supports_admin_revocation: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, email: &str, password: &str, verified: bool) -> Self {
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            MockAccount {
                password: password.to_string(),
                verified,
            },
        );
        self
    }

    fn session_for(&self, email: &str) -> ProviderSession {
        let session = ProviderSession {
            access_token: format!("tok-{email}"),
            user_id: format!("user-{email}"),
            email: Some(email.to_string()),
            expires_at: chrono::Utc::now().timestamp() + 3600,
        };
        *self.session.lock().unwrap() = Some(session.clone());
        session
    }

    pub fn drop_session(&self) {
        *self.session.lock().unwrap() = None;
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> ProviderResult<ProviderSession> {
        if self.rate_limited.load(Ordering::SeqCst) {
            return Err(ProviderError::new("Email rate limit exceeded"));
        }

        let verified = {
            let accounts = self.accounts.lock().unwrap();
            match accounts.get(email) {
                Some(account) if account.password == password => account.verified,
                _ => return Err(ProviderError::new("Invalid login credentials")),
            }
        };

        if !verified {
            return Err(ProviderError::new("Email not confirmed"));
        }
        Ok(self.session_for(email))
    }

    async fn sign_up(&self, email: &str, password: &str) -> ProviderResult<ProviderUser> {
        let mut accounts = self.accounts.lock().unwrap();

        if accounts.contains_key(email) {
            if self.silent_duplicates.load(Ordering::SeqCst) {
                return Ok(ProviderUser {
                    id: format!("user-{email}"),
                    email: Some(email.to_string()),
                    identities: vec![],
                });
            }
            return Err(ProviderError::new("User already registered"));
        }

        accounts.insert(
            email.to_string(),
            MockAccount {
                password: password.to_string(),
                verified: false,
            },
        );

        Ok(ProviderUser {
            id: format!("user-{email}"),
            email: Some(email.to_string()),
            identities: vec![serde_json::json!({ "provider": "email" })],
        })
    }

    async fn sign_in_with_otp(&self, email: &str, opts: OtpOptions) -> ProviderResult<()> {
        if self.rate_limited.load(Ordering::SeqCst) {
            return Err(ProviderError::new("Email rate limit exceeded"));
        }

        let mut accounts = self.accounts.lock().unwrap();
        if !accounts.contains_key(email) {
            if !opts.create_if_absent {
                return Err(ProviderError::new("Signups not allowed for otp"));
            }
            accounts.insert(
                email.to_string(),
                MockAccount {
                    password: String::new(),
                    verified: false,
                },
            );
        }
        drop(accounts);

        self.otp_dispatches
            .lock()
            .unwrap()
            .push((email.to_string(), opts.create_if_absent));
        Ok(())
    }

    async fn verify_otp(&self, email: &str, code: &str) -> ProviderResult<ProviderSession> {
        if code != MOCK_OTP_CODE {
            return Err(ProviderError::new("Token has expired or is invalid"));
        }
        if let Some(account) = self.accounts.lock().unwrap().get_mut(email) {
            account.verified = true;
        }
        Ok(self.session_for(email))
    }

    async fn update_password(&self, _access_token: &str, new_password: &str) -> ProviderResult<()> {
        let email = self
            .session
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|s| s.email.clone())
            .ok_or_else(|| ProviderError::new("no active session"))?;

        if let Some(account) = self.accounts.lock().unwrap().get_mut(&email) {
            account.password = new_password.to_string();
        }
        self.password_updates
            .lock()
            .unwrap()
            .push(new_password.to_string());
        Ok(())
    }

    async fn sign_out(&self, _access_token: &str, _scope: SignOutScope) -> ProviderResult<()> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(ProviderError::new("network down"));
        }
        self.drop_session();
        Ok(())
    }

    async fn get_session(&self) -> ProviderResult<Option<ProviderSession>> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn invalidate_refresh_tokens(&self, user_id: &str) -> ProviderResult<()> {
        if !self.supports_admin_revocation.load(Ordering::SeqCst) {
            return Err(ProviderError::new("refresh token revocation not supported"));
        }
        self.admin_revocations
            .lock()
            .unwrap()
            .push(user_id.to_string());
        Ok(())
    }
}

/// In-memory registry keyed by access token (one mock user per token).
#[derive(Default)]
pub struct MockRegistry {
    pub rows: Mutex<HashMap<String, HashSet<String>>>,
    pub fail_unregister: AtomicBool,
    /// When set, device_count reports this instead of the row count.
    pub count_override: Mutex<Option<usize>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceRegistry for MockRegistry {
    async fn register(&self, access_token: &str, device_id: &str) -> Result<usize, RegistryError> {
        let mut rows = self.rows.lock().unwrap();
        let devices = rows.entry(access_token.to_string()).or_default();
        devices.insert(device_id.to_string());
        Ok(devices.len())
    }

    async fn unregister(
        &self,
        access_token: &str,
        device_id: &str,
    ) -> Result<usize, RegistryError> {
        if self.fail_unregister.load(Ordering::SeqCst) {
            return Err(RegistryError::new("registry unreachable"));
        }
        let mut rows = self.rows.lock().unwrap();
        let devices = rows.entry(access_token.to_string()).or_default();
        devices.remove(device_id);
        Ok(devices.len())
    }

    async fn unregister_all(&self, access_token: &str) -> Result<usize, RegistryError> {
        if self.fail_unregister.load(Ordering::SeqCst) {
            return Err(RegistryError::new("registry unreachable"));
        }
        self.rows.lock().unwrap().remove(access_token);
        Ok(0)
    }

    async fn device_count(&self, access_token: &str) -> Result<usize, RegistryError> {
        if let Some(count) = *self.count_override.lock().unwrap() {
            return Ok(count);
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(access_token)
            .map(|d| d.len())
            .unwrap_or(0))
    }

    async fn heartbeat(&self, _access_token: &str, _device_id: &str) -> Result<(), RegistryError> {
        Ok(())
    }
}
