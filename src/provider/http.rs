use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::provider::{
    IdentityProvider, OtpOptions, ProviderError, ProviderResult, ProviderSession, ProviderUser,
    SignOutScope,
};

/// Adapter for a GoTrue-style identity REST API. All OTP/password semantics
/// live on the remote side; this just shuttles JSON.
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    // refreshed/replaced on every successful sign-in or verify
    cached_session: Mutex<Option<ProviderSession>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    user: ProviderUser,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "msg", alias = "error_description", alias = "message")]
    error: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            cached_session: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn error_from(resp: reqwest::Response) -> ProviderError {
        let status = resp.status().as_u16();
        let message = match resp.text().await {
            Ok(body) => match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => parsed.error.unwrap_or(body),
                Err(_) => body,
            },
            Err(e) => e.to_string(),
        };
        ProviderError {
            status: Some(status),
            message,
        }
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
        bearer: Option<&str>,
    ) -> ProviderResult<reqwest::Response> {
        let mut req = self
            .http
            .post(self.url(path))
            .header("apikey", &self.api_key)
            .json(&body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ProviderError::new(e.to_string()))?;

        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(Self::error_from(resp).await)
        }
    }

    async fn session_from(&self, resp: reqwest::Response) -> ProviderResult<ProviderSession> {
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::new(e.to_string()))?;

        let session = ProviderSession {
            access_token: token.access_token,
            user_id: token.user.id,
            email: token.user.email,
            expires_at: chrono::Utc::now().timestamp() + token.expires_in,
        };

        *self.cached_session.lock().await = Some(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> ProviderResult<ProviderSession> {
        let resp = self
            .post_json(
                "/token?grant_type=password",
                json!({ "email": email, "password": password }),
                None,
            )
            .await?;
        self.session_from(resp).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> ProviderResult<ProviderUser> {
        let resp = self
            .post_json("/signup", json!({ "email": email, "password": password }), None)
            .await?;
        resp.json()
            .await
            .map_err(|e| ProviderError::new(e.to_string()))
    }

    async fn sign_in_with_otp(&self, email: &str, opts: OtpOptions) -> ProviderResult<()> {
        self.post_json(
            "/otp",
            json!({ "email": email, "create_user": opts.create_if_absent }),
            None,
        )
        .await?;
        Ok(())
    }

    async fn verify_otp(&self, email: &str, code: &str) -> ProviderResult<ProviderSession> {
        let resp = self
            .post_json(
                "/verify",
                json!({ "type": "email", "email": email, "token": code }),
                None,
            )
            .await?;
        self.session_from(resp).await
    }

    async fn update_password(&self, access_token: &str, new_password: &str) -> ProviderResult<()> {
        let resp = self
            .http
            .put(self.url("/user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .json(&json!({ "password": new_password }))
            .send()
            .await
            .map_err(|e| ProviderError::new(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(resp).await)
        }
    }

    async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> ProviderResult<()> {
        let scope_param = match scope {
            SignOutScope::Local => "local",
            SignOutScope::Global => "global",
        };

        let result = self
            .post_json(
                &format!("/logout?scope={scope_param}"),
                json!({}),
                Some(access_token),
            )
            .await;

        // 401/404 here means the session is already dead, which is what the
        // caller wanted anyway.
        match result {
            Ok(_) => {}
            Err(ref e) if matches!(e.status, Some(401) | Some(404)) => {}
            Err(e) => return Err(e),
        }

        *self.cached_session.lock().await = None;
        Ok(())
    }

    async fn get_session(&self) -> ProviderResult<Option<ProviderSession>> {
        let mut guard = self.cached_session.lock().await;
        if let Some(session) = guard.as_ref() {
            if session.expires_at <= chrono::Utc::now().timestamp() {
                *guard = None;
            }
        }
        Ok(guard.clone())
    }

    async fn invalidate_refresh_tokens(&self, user_id: &str) -> ProviderResult<()> {
        self.post_json(&format!("/admin/users/{user_id}/logout"), json!({}), None)
            .await?;
        Ok(())
    }
}
