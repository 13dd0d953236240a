//! Axum WebSocket upgrade handler.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::app_state::AppState;

/// `GET /api/v1/ws`: upgrades the HTTP connection to a WebSocket and starts a
/// Stratum session on it.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let service = std::sync::Arc::clone(&state.subscription_service);
    let config = state.session_config;

    ws.on_upgrade(move |socket| run_connection(socket, service, config))
}
