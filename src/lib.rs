//! # stratum-gateway
//!
//! Stratum mining server speaking JSON-RPC over WebSocket.
//!
//! Clients connect, subscribe to mining work, and authorize workers. Each
//! connection holds at most one subscription, identified on the wire by a
//! server-assigned `extraNonce1`; a client that reconnects can resume its
//! prior subscription as long as no other live connection holds it.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP health)
//!     │
//!     ├── HTTP router (api/)
//!     ├── WS sessions: read / write / shutdown paths (ws/)
//!     │
//!     ├── JSON-RPC decode + error kinds (rpc/)
//!     ├── SubscriptionService (service/)
//!     │
//!     └── SubscriptionStore: PostgreSQL or in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod rpc;
pub mod service;
pub mod ws;
