//! JSON-RPC request/response envelopes and inbound decoding.

use serde::{Deserialize, Serialize};

use super::error::{RpcError, RpcErrorKind};

/// Inbound request envelope.
///
/// Missing `id` and `method` decode to their zero values so that
/// [`decode`] can tell an Invalid-Request from a Parse-Error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Client-chosen request id; `0` is not a usable id.
    #[serde(default)]
    pub id: i64,
    /// Method name, e.g. `"mining.subscribe"`.
    #[serde(default)]
    pub method: String,
    /// Positional string parameters. Absent and `null` both mean empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
}

impl RpcRequest {
    /// Returns the parameters, empty if none were sent.
    #[must_use]
    pub fn params(&self) -> &[String] {
        self.params.as_deref().unwrap_or_default()
    }
}

/// Outbound response envelope.
///
/// Exactly one of `result` and `error` is set. `id` is omitted when the
/// failure cannot be correlated with a validated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Id of the request being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Builds a success response for request `id`.
    #[must_use]
    pub fn success(id: i64, result: serde_json::Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response, optionally correlated with a request id.
    #[must_use]
    pub fn failure(id: Option<i64>, kind: RpcErrorKind) -> Self {
        Self {
            id,
            result: None,
            error: Some(kind.into()),
        }
    }

    /// Returns the error code if this is an error response.
    #[must_use]
    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Decodes a raw inbound frame into a request.
///
/// # Errors
///
/// Returns [`RpcErrorKind::Parse`] if the bytes are not a JSON object of
/// the request shape, and [`RpcErrorKind::InvalidRequest`] if `id` is `0`
/// or `method` is empty.
pub fn decode(raw: &[u8]) -> Result<RpcRequest, RpcErrorKind> {
    let req: RpcRequest = serde_json::from_slice(raw).map_err(|e| {
        tracing::debug!(error = %e, "error decoding JSON-RPC message");
        RpcErrorKind::Parse
    })?;

    if req.id == 0 || req.method.is_empty() {
        tracing::debug!(id = req.id, method = %req.method, "invalid JSON-RPC message");
        return Err(RpcErrorKind::InvalidRequest);
    }

    Ok(req)
}
