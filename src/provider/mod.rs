pub mod classify;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A credential set held by the client after a successful authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    pub user_id: String,
    pub email: Option<String>,
    pub expires_at: i64,
}

/// The provider's view of a user. An empty identity list on a "successful"
/// sign-up means the email already belongs to someone (the provider hides
/// the duplicate instead of erroring).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub identities: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ProviderError {
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(f, "provider error ({code}): {}", self.message),
            None => write!(f, "provider error: {}", self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutScope {
    /// This device only.
    Local,
    /// Every device holding a refresh credential.
    Global,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OtpOptions {
    /// When false the provider must refuse to mint a new account for an
    /// unknown email (used as an "is this email registered?" preflight).
    pub create_if_absent: bool,
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Seam to the external identity provider. Password hashing, OTP generation
/// and token minting all live behind this trait.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> ProviderResult<ProviderSession>;

    async fn sign_up(&self, email: &str, password: &str) -> ProviderResult<ProviderUser>;

    /// Dispatches a one-time code to the email address.
    async fn sign_in_with_otp(&self, email: &str, opts: OtpOptions) -> ProviderResult<()>;

    async fn verify_otp(&self, email: &str, code: &str) -> ProviderResult<ProviderSession>;

    async fn update_password(&self, access_token: &str, new_password: &str)
        -> ProviderResult<()>;

    /// Signing out an already-signed-out session is a success.
    async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> ProviderResult<()>;

    /// The locally cached (refreshed if needed) session, or None.
    async fn get_session(&self) -> ProviderResult<Option<ProviderSession>>;

    /// Administrative: revoke every outstanding refresh credential for the
    /// user. Providers without this capability keep the default, and callers
    /// must tolerate the failure.
    async fn invalidate_refresh_tokens(&self, _user_id: &str) -> ProviderResult<()> {
        Err(ProviderError::new("refresh token revocation not supported"))
    }
}
