//! Gateway error types.
//!
//! [`GatewayError`] is the server-side failure type shared by the
//! persistence port and the subscription service. It never reaches the
//! wire directly: the connection session maps it onto a JSON-RPC
//! Internal-Error (see [`crate::rpc::RpcErrorKind`]).

use crate::domain::ExtraNonce1;

/// Server-side error enum.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The store has no subscription row with the given extra nonce.
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(ExtraNonce1),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

/// Configuration loading failure.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A mandatory environment variable is not set.
    #[error("missing mandatory environment variable: {0}")]
    MissingVar(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value for environment variable {name}: {value:?}")]
    InvalidVar {
        /// Variable name.
        name: &'static str,
        /// Raw value found in the environment.
        value: String,
    },
}
