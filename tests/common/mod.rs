//! Shared helpers: an in-process server backed by the in-memory store and
//! a small WebSocket client.

#![allow(dead_code, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use stratum_gateway::api;
use stratum_gateway::app_state::AppState;
use stratum_gateway::config::SessionConfig;
use stratum_gateway::domain::ExtraNonce1;
use stratum_gateway::persistence::{InMemorySubscriptionStore, SubscriptionStore};
use stratum_gateway::service::SubscriptionService;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// A running server and the store behind it.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<InMemorySubscriptionStore>,
}

impl TestServer {
    /// Binds an ephemeral port and serves the full router on it.
    pub async fn start() -> Self {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let state = AppState {
            subscription_service: Arc::new(SubscriptionService::new(
                Arc::clone(&store) as Arc<dyn SubscriptionStore>
            )),
            session_config: SessionConfig::default(),
        };
        let app = api::build_router().with_state(state);

        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("failed to bind test listener");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("listener has no local address");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, store }
    }

    /// `http://` URL for `path`.
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Opens a WebSocket session.
    pub async fn connect(&self) -> Client {
        let url = format!("ws://{}/api/v1/ws", self.addr);
        let Ok((ws, _)) = tokio_tungstenite::connect_async(url).await else {
            panic!("websocket handshake failed");
        };
        Client { ws }
    }

    /// Waits until the row is marked inactive.
    pub async fn wait_inactive(&self, extra_nonce1: ExtraNonce1) {
        let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
        loop {
            if let Some(row) = self.store.get(extra_nonce1).await
                && !row.active_session
            {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("subscription {extra_nonce1} never deactivated");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// One client connection.
pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    /// Sends a raw text frame and returns the next JSON reply.
    pub async fn call(&mut self, text: &str) -> Value {
        if self.ws.send(Message::text(text)).await.is_err() {
            panic!("failed to send request");
        }
        self.next_json().await
    }

    /// Reads frames until the next text frame and parses it.
    pub async fn next_json(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(READ_TIMEOUT, self.ws.next()).await;
            let Ok(Some(Ok(message))) = frame else {
                panic!("no reply from server");
            };
            if let Message::Text(text) = message {
                let Ok(value) = serde_json::from_str(text.as_str()) else {
                    panic!("reply is not json: {text}");
                };
                return value;
            }
        }
    }

    /// Closes the connection from the client side.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Extracts the `extraNonce1` from a subscribe reply.
pub fn extra_nonce1_hex(reply: &Value) -> String {
    let Some(hex) = reply.pointer("/result/1").and_then(Value::as_str) else {
        panic!("not a subscribe result: {reply}");
    };
    hex.to_string()
}

/// Returns the error code of a reply, if any.
pub fn error_code(reply: &Value) -> Option<i64> {
    reply.pointer("/error/code").and_then(Value::as_i64)
}
