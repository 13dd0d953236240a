//! Persistence layer: the subscription store port and its backends.
//!
//! The rest of the crate only talks to storage through the
//! [`SubscriptionStore`] trait. [`postgres::PostgresSubscriptionStore`] is
//! the production backend; [`memory::InMemorySubscriptionStore`] serves
//! deployments with persistence disabled, and tests.
//!
//! Every operation expects exactly one row. Only [`SubscriptionStore::fetch`]
//! and [`SubscriptionStore::claim`] treat a missing row as a regular outcome
//! (`Ok(None)`).

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::{ExtraNonce1, NewSubscription, Subscription};
use crate::error::GatewayError;

pub use memory::InMemorySubscriptionStore;
pub use postgres::PostgresSubscriptionStore;

/// Storage port for subscription rows.
///
/// Implementations must be safe to call concurrently from unrelated
/// connections; calls made by a single connection are sequential.
#[async_trait]
pub trait SubscriptionStore: Send + Sync + std::fmt::Debug {
    /// Looks up the row matching both `subscriber` and `extra_nonce1`.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on storage failure. A missing row is
    /// `Ok(None)`, not an error.
    async fn fetch(
        &self,
        subscriber: &str,
        extra_nonce1: ExtraNonce1,
    ) -> Result<Option<Subscription>, GatewayError>;

    /// Inserts a row and returns it with the store-assigned fields
    /// (`extra_nonce1`, `created_at`, `active_session`) populated.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on storage failure.
    async fn create(&self, new: NewSubscription) -> Result<Subscription, GatewayError>;

    /// Sets `active_session` on the row identified by `extra_nonce1` and
    /// returns the persisted value.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] if no such row exists
    /// and another [`GatewayError`] on storage failure.
    async fn set_active_session(
        &self,
        extra_nonce1: ExtraNonce1,
        active: bool,
    ) -> Result<bool, GatewayError>;

    /// Marks the row matching both `subscriber` and `extra_nonce1` active
    /// if it is currently inactive, and returns it.
    ///
    /// The check and the update are a single atomic step, so at most one
    /// of several concurrent callers gets the row. `Ok(None)` means no
    /// inactive row matched.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on storage failure.
    async fn claim(
        &self,
        subscriber: &str,
        extra_nonce1: ExtraNonce1,
    ) -> Result<Option<Subscription>, GatewayError>;
}
