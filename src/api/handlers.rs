use axum::{extract::State, http::StatusCode, Json};
use tracing::{info, warn};

use crate::api::auth::AuthenticatedUser;
use crate::api::types::*;
use crate::revocation::RegistryOp;
use crate::state::AppState;

type HandlerError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> HandlerError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ------------------------------------------------------------
// POST /devices — idempotent upsert for the caller's device
// ------------------------------------------------------------
pub async fn register_device(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<Json<DeviceCountResponse>, HandlerError> {
    if req.device_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "device_id is required".into()));
    }

    state
        .db
        .register_device(&claims.sub, &req.device_id, req.meta.clone())
        .await
        .map_err(internal)?;

    state.hub.notify_change(&claims.sub, RegistryOp::Register);

    let device_count = state.db.count_devices(&claims.sub).await.map_err(internal)?;

    info!(
        user_id = claims.sub.as_str(),
        device_id = req.device_id.as_str(),
        device_count,
        "device registered"
    );

    Ok(Json(DeviceCountResponse { device_count }))
}

// ------------------------------------------------------------
// DELETE /devices — one row or all of them
// ------------------------------------------------------------
pub async fn delete_device(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(req): Json<DeleteDeviceRequest>,
) -> Result<Json<DeviceCountResponse>, HandlerError> {
    if req.all {
        let removed = state
            .db
            .remove_all_devices(&claims.sub)
            .await
            .map_err(internal)?;

        state.hub.notify_change(&claims.sub, RegistryOp::DeleteAll);
        // Global logout: every other device must drop its session too.
        state.hub.broadcast_logout(&claims.sub, None);

        info!(user_id = claims.sub.as_str(), removed, "all devices removed");
    } else {
        let Some(device_id) = req.device_id.as_deref().filter(|d| !d.trim().is_empty()) else {
            return Err((
                StatusCode::BAD_REQUEST,
                "device_id or all:true is required".into(),
            ));
        };

        // Absent row is still success: concurrent logouts race here.
        state
            .db
            .remove_device(&claims.sub, device_id)
            .await
            .map_err(internal)?;

        state.hub.notify_change(&claims.sub, RegistryOp::Delete);
        state
            .hub
            .broadcast_logout(&claims.sub, Some(device_id.to_string()));

        info!(
            user_id = claims.sub.as_str(),
            device_id, "device removed"
        );
    }

    let device_count = state.db.count_devices(&claims.sub).await.map_err(internal)?;
    Ok(Json(DeviceCountResponse { device_count }))
}

// ------------------------------------------------------------
// GET /device-count
// ------------------------------------------------------------
pub async fn device_count(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> Result<Json<DeviceCountResponse>, HandlerError> {
    let device_count = state.db.count_devices(&claims.sub).await.map_err(internal)?;
    Ok(Json(DeviceCountResponse { device_count }))
}

// ------------------------------------------------------------
// POST /devices/heartbeat — refresh last_active for the caller's device
// ------------------------------------------------------------
pub async fn heartbeat(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    let touched = state
        .db
        .touch_device(&claims.sub, &req.device_id)
        .await
        .map_err(internal)?;

    Ok(Json(serde_json::json!({ "ok": touched })))
}

// ------------------------------------------------------------
// POST /admin/logout-all — admin-only force logout
// ------------------------------------------------------------
pub async fn admin_logout_all(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(req): Json<AdminLogoutRequest>,
) -> Result<Json<AdminLogoutResponse>, HandlerError> {
    if !claims.is_admin() {
        return Err((StatusCode::FORBIDDEN, "admin role required".into()));
    }

    if req.user_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "user_id is required".into()));
    }

    // Best effort: a provider without refresh-token revocation is tolerated,
    // the device rows still get cleared.
    let mut tokens_invalidated = false;
    if let Some(provider) = state.provider.as_ref() {
        match provider.invalidate_refresh_tokens(&req.user_id).await {
            Ok(()) => tokens_invalidated = true,
            Err(err) => {
                warn!(
                    user_id = req.user_id.as_str(),
                    error = %err,
                    "refresh token invalidation failed, continuing with device cleanup"
                );
            }
        }
    }

    let devices_removed = state
        .db
        .remove_all_devices(&req.user_id)
        .await
        .map_err(internal)?;

    state.hub.notify_change(&req.user_id, RegistryOp::DeleteAll);
    state.hub.broadcast_logout(&req.user_id, None);

    info!(
        admin = claims.sub.as_str(),
        user_id = req.user_id.as_str(),
        devices_removed,
        tokens_invalidated,
        "administrative force logout"
    );

    Ok(Json(AdminLogoutResponse {
        user_id: req.user_id,
        devices_removed,
        tokens_invalidated,
    }))
}
