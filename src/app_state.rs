//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::SessionConfig;
use crate::service::SubscriptionService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Subscription service shared by every connection.
    pub subscription_service: Arc<SubscriptionService>,
    /// Timing and sizing applied to each new WebSocket session.
    pub session_config: SessionConfig,
}
