use axum::{
    routing::{get, post},
    Extension, Router,
};

use crate::state::AppState;

pub mod auth;
pub mod handlers;
pub mod types;

use auth::JwtState;
use handlers::{admin_logout_all, delete_device, device_count, heartbeat, register_device};

/// Session-registry router (bearer-token protected).
pub fn api_router(secret: String) -> Router<AppState> {
    Router::new()
        .route("/devices", post(register_device).delete(delete_device))
        .route("/devices/heartbeat", post(heartbeat))
        .route("/device-count", get(device_count))
        .route("/admin/logout-all", post(admin_logout_all))
        .layer(Extension(JwtState { secret }))
}
