//! In-memory subscription store.
//!
//! Mirrors the PostgreSQL table semantics: identities come from a
//! sequence starting at 1, rows are created active and stamped with the
//! current time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::SubscriptionStore;
use crate::domain::{ExtraNonce1, NewSubscription, Subscription};
use crate::error::GatewayError;

/// Subscription rows kept in a `RwLock<HashMap<...>>`.
#[derive(Debug)]
pub struct InMemorySubscriptionStore {
    rows: RwLock<HashMap<ExtraNonce1, Subscription>>,
    sequence: AtomicI64,
}

impl InMemorySubscriptionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            sequence: AtomicI64::new(1),
        }
    }

    /// Returns a copy of the row with the given identity, if any.
    pub async fn get(&self, extra_nonce1: ExtraNonce1) -> Option<Subscription> {
        self.rows.read().await.get(&extra_nonce1).cloned()
    }

    /// Returns the number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns `true` if the store holds no rows.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

impl Default for InMemorySubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn fetch(
        &self,
        subscriber: &str,
        extra_nonce1: ExtraNonce1,
    ) -> Result<Option<Subscription>, GatewayError> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&extra_nonce1)
            .filter(|sub| sub.subscriber == subscriber)
            .cloned())
    }

    async fn create(&self, new: NewSubscription) -> Result<Subscription, GatewayError> {
        let extra_nonce1 = ExtraNonce1::new(self.sequence.fetch_add(1, Ordering::Relaxed));
        let sub = Subscription {
            extra_nonce1,
            extra_nonce2: new.extra_nonce2,
            set_difficulty: new.set_difficulty,
            notify: new.notify,
            subscriber: new.subscriber,
            created_at: Utc::now(),
            active_session: true,
        };
        self.rows.write().await.insert(extra_nonce1, sub.clone());
        Ok(sub)
    }

    async fn set_active_session(
        &self,
        extra_nonce1: ExtraNonce1,
        active: bool,
    ) -> Result<bool, GatewayError> {
        let mut rows = self.rows.write().await;
        let sub = rows
            .get_mut(&extra_nonce1)
            .ok_or(GatewayError::SubscriptionNotFound(extra_nonce1))?;
        sub.active_session = active;
        Ok(sub.active_session)
    }

    async fn claim(
        &self,
        subscriber: &str,
        extra_nonce1: ExtraNonce1,
    ) -> Result<Option<Subscription>, GatewayError> {
        let mut rows = self.rows.write().await;
        Ok(rows
            .get_mut(&extra_nonce1)
            .filter(|sub| sub.subscriber == subscriber && !sub.active_session)
            .map(|sub| {
                sub.active_session = true;
                sub.clone()
            }))
    }
}
