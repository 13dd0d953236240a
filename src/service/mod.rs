//! Service layer: subscription lifecycle.
//!
//! [`SubscriptionService`] owns the create / resume / deactivate
//! semantics and mediates every call into the
//! [`crate::persistence::SubscriptionStore`].

pub mod subscription_service;

pub use subscription_service::{DEFAULT_EXTRA_NONCE2, SubscriptionService};
