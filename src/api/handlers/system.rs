//! System endpoints: health check.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: u16,
    version: String,
    timestamp: String,
}

/// `GET /api/v1/health`: service health status.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "System",
    summary = "Health check",
    description = "Returns the service status code, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: StatusCode::OK.as_u16(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }),
    )
}

/// System routes, nested under `/api/v1` by the caller.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
