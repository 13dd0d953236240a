//! Subscription service: creates, resumes, and deactivates subscriptions.

use std::sync::Arc;

use crate::domain::{ExtraNonce1, NewSubscription, Subscription};
use crate::error::GatewayError;
use crate::persistence::SubscriptionStore;

/// `extraNonce2` handed to every subscription.
///
/// A fixed value rather than a per-subscription allocation.
pub const DEFAULT_EXTRA_NONCE2: i64 = 4;

/// Mediates every subscription state transition and store call.
///
/// Shared by all connections; each method blocks its caller until the
/// store replies.
#[derive(Debug, Clone)]
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionService {
    /// Creates a new `SubscriptionService` over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Returns the `extraNonce2` assigned to new subscriptions.
    #[must_use]
    pub const fn extra_nonce2(&self) -> i64 {
        DEFAULT_EXTRA_NONCE2
    }

    /// Looks up the subscription a client asks to resume.
    ///
    /// Returns `Ok(None)` when no row matches both fields.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the store fails.
    pub async fn lookup_existing(
        &self,
        subscriber: &str,
        extra_nonce1: ExtraNonce1,
    ) -> Result<Option<Subscription>, GatewayError> {
        let found = self
            .store
            .fetch(subscriber, extra_nonce1)
            .await
            .inspect_err(|e| {
                tracing::error!(subscriber, %extra_nonce1, error = %e, "error getting subscription");
            })?;

        if found.is_none() {
            tracing::info!(subscriber, %extra_nonce1, "no subscription found");
        }
        Ok(found)
    }

    /// Creates a fresh subscription for `subscriber` with newly generated
    /// difficulty and notify tokens.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the store fails.
    pub async fn create_new(&self, subscriber: &str) -> Result<Subscription, GatewayError> {
        let new = NewSubscription {
            extra_nonce2: self.extra_nonce2(),
            set_difficulty: uuid::Uuid::new_v4().to_string(),
            notify: uuid::Uuid::new_v4().to_string(),
            subscriber: subscriber.to_string(),
        };

        let sub = self.store.create(new).await.inspect_err(|e| {
            tracing::error!(subscriber, error = %e, "error creating subscription");
        })?;

        tracing::info!(subscriber, extra_nonce1 = %sub.extra_nonce1, "subscription created");
        Ok(sub)
    }

    /// Claims an inactive subscription for a resuming session.
    ///
    /// Returns `Ok(None)` if the row is missing or another session holds
    /// it; of several concurrent claims at most one succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the store fails.
    pub async fn claim(
        &self,
        subscriber: &str,
        extra_nonce1: ExtraNonce1,
    ) -> Result<Option<Subscription>, GatewayError> {
        let claimed = self
            .store
            .claim(subscriber, extra_nonce1)
            .await
            .inspect_err(|e| {
                tracing::error!(subscriber, %extra_nonce1, error = %e, "error activating subscription");
            })?;

        match &claimed {
            Some(_) => tracing::info!(subscriber, %extra_nonce1, "subscription resumed"),
            None => tracing::info!(subscriber, %extra_nonce1, "subscription already claimed"),
        }
        Ok(claimed)
    }

    /// Marks the subscription inactive. Best effort: failures are logged
    /// and swallowed.
    pub async fn deactivate(&self, subscription: &Subscription) {
        let extra_nonce1 = subscription.extra_nonce1;
        match self.store.set_active_session(extra_nonce1, false).await {
            Ok(_) => tracing::debug!(%extra_nonce1, "subscription deactivated"),
            Err(e) => tracing::warn!(%extra_nonce1, error = %e, "error inactivating subscription"),
        }
    }
}
