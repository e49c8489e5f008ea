use anyhow::{Context, Result};

/// Server bootstrap config, read from the environment (.env supported).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub db_path: String,
    pub jwt_secret: String,
    /// Identity provider admin endpoint; absent means admin logout-all skips
    /// refresh-token revocation.
    pub provider_url: Option<String>,
    pub provider_service_key: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "sessiondb".into()),
            jwt_secret,
            provider_url: std::env::var("PROVIDER_URL").ok().filter(|s| !s.is_empty()),
            provider_service_key: std::env::var("PROVIDER_SERVICE_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
        })
    }
}
