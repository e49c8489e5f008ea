use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sessionwarden::config::ServerConfig;
use sessionwarden::db::DBLayer;
use sessionwarden::provider::http::HttpIdentityProvider;
use sessionwarden::provider::IdentityProvider;
use sessionwarden::revocation::RevocationHub;
use sessionwarden::state::AppState;
use sessionwarden::{api, revocation};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------
    // Logging
    // -----------------------------
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let _ = dotenvy::dotenv();
    let config = ServerConfig::from_env()?;

    // -----------------------------
    // Shared state / Dependencies
    // -----------------------------
    let db = Arc::new(DBLayer::new(&config.db_path)?);
    let hub = Arc::new(RevocationHub::new());

    let identity_provider: Option<Arc<dyn IdentityProvider>> = match (
        config.provider_url.as_deref(),
        config.provider_service_key.as_deref(),
    ) {
        (Some(url), Some(key)) => Some(Arc::new(HttpIdentityProvider::new(url, key))),
        _ => {
            tracing::warn!(
                "no identity provider configured; admin logout-all will only clear device rows"
            );
            None
        }
    };

    let state = AppState {
        db,
        hub,
        jwt_secret: config.jwt_secret.clone(),
        provider: identity_provider,
    };

    // -----------------------------
    // Routers
    // -----------------------------
    let app = Router::new()
        // Session registry (bearer protected)
        .merge(api::api_router(config.jwt_secret.clone()))
        // Revocation fan-out
        .merge(revocation::ws::ws_router())
        // CORS for frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        // Attach shared state
        .with_state(state);

    let addr = config.bind_addr.as_str();

    println!("🌐 HTTP listening on http://{addr}");
    println!("🔌 Revocation stream at ws://{addr}/ws/revocations");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
