//! JSON-RPC error kinds and their wire representation.

use serde::{Deserialize, Serialize};

/// The failures a request can be answered with.
///
/// Each kind maps to a fixed code in the JSON-RPC 2.0 reserved range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum RpcErrorKind {
    /// The payload is not valid JSON of the request shape.
    #[error("Parse error")]
    Parse,
    /// The payload parsed but has no usable `id` or `method`.
    #[error("Invalid Request")]
    InvalidRequest,
    /// The method does not exist or is not available.
    #[error("Method not found")]
    MethodNotFound,
    /// The parameters are missing, malformed, or not acceptable in the
    /// current session state.
    #[error("Invalid params")]
    InvalidParams,
    /// The server failed while handling the request.
    #[error("Internal error")]
    Internal,
}

impl RpcErrorKind {
    /// Returns the JSON-RPC error code for this kind.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Parse => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,
        }
    }

    /// Returns the standard message for this kind.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Parse => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::Internal => "Internal error",
        }
    }
}

/// Error object carried in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl From<RpcErrorKind> for RpcError {
    fn from(kind: RpcErrorKind) -> Self {
        Self {
            code: kind.code(),
            message: kind.message().to_string(),
            data: None,
        }
    }
}
