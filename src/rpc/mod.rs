//! JSON-RPC protocol layer: request framing, error kinds, and responses.
//!
//! Inbound frames are decoded with [`decode`] into an [`RpcRequest`] or a
//! framing [`RpcErrorKind`]. Handlers answer every request with exactly
//! one [`RpcResponse`].

pub mod error;
pub mod messages;

pub use error::{RpcError, RpcErrorKind};
pub use messages::{RpcRequest, RpcResponse, decode};
