//! WebSocket layer: connection sessions, the outbound queue, and the
//! Stratum method handlers.
//!
//! The WebSocket endpoint at `/api/v1/ws` carries JSON-RPC requests for
//! `mining.subscribe` and `mining.authorize`.

pub mod connection;
pub mod handler;
pub mod mining;
pub mod outbound;

pub use connection::{Session, run_connection, run_session};
