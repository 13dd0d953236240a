//! stratum-gateway server entry point.
//!
//! Starts the Axum HTTP server with the health and WebSocket endpoints.

use std::sync::Arc;

use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use stratum_gateway::api;
use stratum_gateway::app_state::AppState;
use stratum_gateway::config::GatewayConfig;
use stratum_gateway::persistence::{
    InMemorySubscriptionStore, PostgresSubscriptionStore, SubscriptionStore,
};
use stratum_gateway::service::SubscriptionService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting stratum-gateway");

    // Build persistence layer
    let store: Arc<dyn SubscriptionStore> = match &config.postgres {
        Some(pg) => {
            let store = PostgresSubscriptionStore::connect(pg).await?;
            store.ensure_schema(&pg.subscriptions_table).await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("persistence disabled, subscriptions are kept in memory");
            Arc::new(InMemorySubscriptionStore::new())
        }
    };

    // Build application state
    let app_state = AppState {
        subscription_service: Arc::new(SubscriptionService::new(store)),
        session_config: config.session,
    };

    // Build router
    let app = api::build_router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "HTTP listener started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
