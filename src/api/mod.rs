//! HTTP layer: route handlers, OpenAPI document, and router composition.
//!
//! All endpoints are mounted under `/api/v1`.

pub mod handlers;

use axum::Router;
use axum::routing::get;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// OpenAPI document for the HTTP endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "stratum-gateway", description = "Stratum mining server over WebSocket"),
    paths(handlers::system::health_handler),
    tags((name = "System", description = "Service status"))
)]
pub struct ApiDoc;

/// Builds the complete router: health endpoint and WebSocket upgrade.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes().route("/ws", get(ws_handler)));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
