use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::device::DeviceIdentity;
use crate::provider::classify::AuthErrorKind;
use crate::provider::{IdentityProvider, SignOutScope};

#[derive(Debug, Clone)]
pub struct RegistryError {
    pub status: Option<u16>,
    pub message: String,
}

impl RegistryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(f, "registry error ({code}): {}", self.message),
            None => write!(f, "registry error: {}", self.message),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Client-side view of the session registry. Flows register devices through
/// it after authentication; the guard polls device_count through it.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn register(&self, access_token: &str, device_id: &str) -> Result<usize, RegistryError>;
    async fn unregister(&self, access_token: &str, device_id: &str)
        -> Result<usize, RegistryError>;
    async fn unregister_all(&self, access_token: &str) -> Result<usize, RegistryError>;
    async fn device_count(&self, access_token: &str) -> Result<usize, RegistryError>;
    async fn heartbeat(&self, access_token: &str, device_id: &str) -> Result<(), RegistryError>;
}

#[derive(Deserialize)]
struct CountBody {
    device_count: usize,
}

/// reqwest adapter for the HTTP surface in `crate::api`.
pub struct HttpRegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRegistryClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn count_from(resp: reqwest::Response) -> Result<usize, RegistryError> {
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let message = resp.text().await.unwrap_or_default();
            return Err(RegistryError {
                status: Some(status),
                message,
            });
        }
        let body: CountBody = resp
            .json()
            .await
            .map_err(|e| RegistryError::new(e.to_string()))?;
        Ok(body.device_count)
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        access_token: &str,
    ) -> Result<reqwest::Response, RegistryError> {
        req.bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| RegistryError::new(e.to_string()))
    }
}

#[async_trait]
impl DeviceRegistry for HttpRegistryClient {
    async fn register(&self, access_token: &str, device_id: &str) -> Result<usize, RegistryError> {
        let req = self
            .http
            .post(format!("{}/devices", self.base_url))
            .json(&json!({ "device_id": device_id }));
        Self::count_from(self.send(req, access_token).await?).await
    }

    async fn unregister(
        &self,
        access_token: &str,
        device_id: &str,
    ) -> Result<usize, RegistryError> {
        let req = self
            .http
            .delete(format!("{}/devices", self.base_url))
            .json(&json!({ "device_id": device_id }));
        Self::count_from(self.send(req, access_token).await?).await
    }

    async fn unregister_all(&self, access_token: &str) -> Result<usize, RegistryError> {
        let req = self
            .http
            .delete(format!("{}/devices", self.base_url))
            .json(&json!({ "all": true }));
        Self::count_from(self.send(req, access_token).await?).await
    }

    async fn device_count(&self, access_token: &str) -> Result<usize, RegistryError> {
        let req = self.http.get(format!("{}/device-count", self.base_url));
        Self::count_from(self.send(req, access_token).await?).await
    }

    async fn heartbeat(&self, access_token: &str, device_id: &str) -> Result<(), RegistryError> {
        let req = self
            .http
            .post(format!("{}/devices/heartbeat", self.base_url))
            .json(&json!({ "device_id": device_id }));
        let resp = self.send(req, access_token).await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(RegistryError {
                status: Some(resp.status().as_u16()),
                message: resp.text().await.unwrap_or_default(),
            })
        }
    }
}

/// One logout path for every caller: registry row(s) first, provider second.
///
/// If the device delete fails the logout is aborted and the local credential
/// stays put, so the server never believes a device is active while the
/// client thinks it logged out. The device identity itself survives logout;
/// re-login on this browser reuses the same id.
pub async fn sign_out_session(
    provider: &dyn IdentityProvider,
    registry: &dyn DeviceRegistry,
    device: &DeviceIdentity,
    scope: SignOutScope,
) -> Result<(), AuthErrorKind> {
    let session = match provider.get_session().await {
        Ok(Some(session)) => session,
        // Already signed out: success, nothing to tear down.
        Ok(None) => return Ok(()),
        Err(_) => return Err(AuthErrorKind::Unexpected),
    };

    let device_id = device.get_or_create();

    let delete_result = match scope {
        SignOutScope::Global => registry.unregister_all(&session.access_token).await,
        SignOutScope::Local if device_id.is_empty() => Ok(0), // nothing registered for us
        SignOutScope::Local => {
            registry
                .unregister(&session.access_token, device_id.as_str())
                .await
        }
    };

    if let Err(err) = delete_result {
        warn!(error = %err, "device unregister failed, aborting logout");
        return Err(AuthErrorKind::DeviceUnregisterFailed);
    }

    if provider.sign_out(&session.access_token, scope).await.is_err() {
        return Err(AuthErrorKind::Unexpected);
    }

    info!(user_id = session.user_id.as_str(), ?scope, "signed out");
    Ok(())
}
