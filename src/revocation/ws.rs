use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{response::IntoResponse, routing::get, Router};

use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::api::auth::decode_claims;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsAuthQuery {
    /// Browser WebSocket clients can't set an Authorization header.
    pub access_token: Option<String>,
}

pub fn ws_router() -> Router<AppState> {
    Router::new().route("/ws/revocations", get(ws_handler))
}

async fn ws_handler(
    ws: axum::extract::WebSocketUpgrade,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<WsAuthQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let token = bearer
        .map(|TypedHeader(Authorization(b))| b.token().to_string())
        .or(query.access_token);

    let Some(token) = token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let claims = match decode_claims(&token, &state.jwt_secret) {
        Ok(c) => c,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims.sub))
}

// ------------------------------------------------------------
// SOCKET LOOP: hub events out, only close/ping traffic in
// ------------------------------------------------------------
async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let mut events = state.hub.subscribe(&user_id);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    info!(user_id = user_id.as_str(), "revocation subscriber connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(p) => p,
                        Err(err) => {
                            eprintln!("failed to encode revocation event: {err}");
                            continue;
                        }
                    };
                    if ws_sender.send(WsMessage::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                // Lagged means we dropped events; the client's polling
                // backstop covers the gap, so just keep streaming.
                Err(RecvError::Lagged(skipped)) => {
                    debug!(user_id = user_id.as_str(), skipped, "revocation stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {} // pings and stray frames
                Some(Err(_)) => break,
            },
        }
    }

    info!(user_id = user_id.as_str(), "revocation subscriber disconnected");
}
