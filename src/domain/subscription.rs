//! Subscription records and the server-assigned extra nonce.
//!
//! [`ExtraNonce1`] is a newtype wrapper around the store-assigned row
//! identity so that it cannot be confused with `extraNonce2` or any other
//! integer. On the wire it is always rendered as lowercase hex text.

use std::fmt;
use std::num::ParseIntError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned portion of the miner nonce space.
///
/// Assigned by the persistence layer when a subscription row is created
/// and never reassigned. Displays as lowercase hex zero-padded to 8 digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraNonce1(i64);

impl ExtraNonce1 {
    /// Wraps a raw row identity.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Parses the hex text a client presents when resuming.
    ///
    /// The text is read as a signed 64-bit base-16 integer without any
    /// `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseIntError`] if the text is empty, not hexadecimal,
    /// or out of range for `i64`.
    pub fn from_hex(text: &str) -> Result<Self, ParseIntError> {
        i64::from_str_radix(text, 16).map(Self)
    }
}

impl fmt::Display for ExtraNonce1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl From<i64> for ExtraNonce1 {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<ExtraNonce1> for i64 {
    fn from(nonce: ExtraNonce1) -> Self {
        nonce.0
    }
}

/// A persisted subscription row.
///
/// One connection holds at most one of these. `active_session` is true
/// while a live connection owns the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Store-assigned identity, unique per row.
    pub extra_nonce1: ExtraNonce1,
    /// Nonce-space partition handed to the miner.
    pub extra_nonce2: i64,
    /// Opaque difficulty token pushed as `mining.set_difficulty`.
    pub set_difficulty: String,
    /// Opaque job-notification token pushed as `mining.notify`.
    pub notify: String,
    /// Worker/account the subscription is tracked under.
    pub subscriber: String,
    /// Creation timestamp set by the store.
    pub created_at: DateTime<Utc>,
    /// Whether a live connection currently holds this subscription.
    pub active_session: bool,
}

/// Values the server chooses before the store assigns the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscription {
    /// Nonce-space partition handed to the miner.
    pub extra_nonce2: i64,
    /// Opaque difficulty token.
    pub set_difficulty: String,
    /// Opaque job-notification token.
    pub notify: String,
    /// Worker/account identifier.
    pub subscriber: String,
}
