//! Database row shapes for the subscriptions table.

use chrono::{DateTime, Utc};

use crate::domain::{ExtraNonce1, Subscription};

/// Column list shared by every statement that returns a full row, in the
/// order [`SubscriptionRow`] expects.
pub const SUBSCRIPTION_COLUMNS: &str =
    "extra_nonce_1, extra_nonce_2, set_difficulty, notify, subscriber, created_at, active_session";

/// A raw row from the subscriptions table, as decoded by `sqlx`.
pub type SubscriptionRow = (i64, i64, String, String, String, DateTime<Utc>, bool);

/// Converts a decoded row into the domain type.
#[must_use]
pub fn into_subscription(row: SubscriptionRow) -> Subscription {
    let (extra_nonce1, extra_nonce2, set_difficulty, notify, subscriber, created_at, active_session) =
        row;
    Subscription {
        extra_nonce1: ExtraNonce1::new(extra_nonce1),
        extra_nonce2,
        set_difficulty,
        notify,
        subscriber,
        created_at,
        active_session,
    }
}
