//! Per-connection session: read path, write path, and shutdown path.
//!
//! Every accepted WebSocket gets one [`Session`] and three spawned tasks:
//!
//! - **read** receives frames, decodes and dispatches them in arrival
//!   order, and queues exactly one response per request;
//! - **write** drains the outbound queue onto the socket and sends a
//!   keepalive ping every `ping_period`;
//! - **shutdown** waits for the close signal and runs the single cleanup
//!   sequence (close frame, release socket, close queue, deactivate).
//!
//! The close signal is a [`CancellationToken`]: any path may fire it any
//! number of times and only the first matters. Each task runs behind a
//! panic boundary that turns a panic into an ordinary close.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures_util::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::outbound::{OutboundQueue, OutboundReceiver};
use crate::config::SessionConfig;
use crate::domain::Subscription;
use crate::rpc::{self, RpcResponse};
use crate::service::SubscriptionService;

type SharedSink<S> = Arc<Mutex<S>>;

/// State shared by the three paths of one connection.
///
/// The subscription slot is written at most once, by the read path, and
/// only read afterwards.
#[derive(Debug)]
pub struct Session {
    id: uuid::Uuid,
    service: Arc<SubscriptionService>,
    outbound: OutboundQueue,
    close: CancellationToken,
    subscription: OnceLock<Subscription>,
}

impl Session {
    /// Creates a session with an empty subscription slot.
    #[must_use]
    pub fn new(service: Arc<SubscriptionService>, outbound: OutboundQueue) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            service,
            outbound,
            close: CancellationToken::new(),
            subscription: OnceLock::new(),
        }
    }

    /// Connection id used in logs.
    #[must_use]
    pub const fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// The subscription service this session talks to.
    #[must_use]
    pub fn service(&self) -> &SubscriptionService {
        &self.service
    }

    /// Returns the subscription bound to this session, if any.
    #[must_use]
    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.get()
    }

    /// Binds the session's subscription. Returns `false` if one was
    /// already bound.
    pub(crate) fn bind_subscription(&self, subscription: Subscription) -> bool {
        self.subscription.set(subscription).is_ok()
    }

    /// Signals the shutdown path. Safe to call from any path, any number
    /// of times.
    pub fn request_close(&self) {
        self.close.cancel();
    }

    /// Returns `true` once close has been requested.
    #[cfg(test)]
    fn is_closing(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Serializes `response` and queues it for the write path.
    ///
    /// Waits while the queue is full. The message is silently dropped if
    /// it cannot be serialized or the queue is already closed.
    pub async fn enqueue(&self, response: &RpcResponse) {
        let Ok(raw) = serde_json::to_string(response) else {
            return;
        };
        if !self.outbound.push(raw).await {
            tracing::debug!("outbound queue closed, response dropped");
        }
    }

    /// Decodes one inbound frame, dispatches it, and queues the single
    /// response.
    pub async fn handle_message(&self, raw: &[u8]) {
        let response = match rpc::decode(raw) {
            Ok(req) => self.dispatch(req).await,
            Err(kind) => RpcResponse::failure(None, kind),
        };
        if let Some(code) = response.error_code() {
            tracing::debug!(code, id = ?response.id, "request failed");
        }
        self.enqueue(&response).await;
    }
}

/// Runs a session over an upgraded axum [`WebSocket`].
pub async fn run_connection(
    socket: WebSocket,
    service: Arc<SubscriptionService>,
    config: SessionConfig,
) {
    let (sink, stream) = socket.split();
    run_session(stream, sink, service, config).await;
}

/// Runs a session over any frame stream/sink pair until all three paths
/// have finished.
pub async fn run_session<St, Si, E>(
    stream: St,
    sink: Si,
    service: Arc<SubscriptionService>,
    config: SessionConfig,
) where
    St: Stream<Item = Result<Message, E>> + Send + Unpin + 'static,
    E: fmt::Display + Send + 'static,
    Si: Sink<Message> + Send + Unpin + 'static,
    Si::Error: fmt::Display + Send,
{
    let (outbound, outbound_rx) = OutboundQueue::bounded(config.outbound_capacity);
    let session = Arc::new(Session::new(service, outbound));
    let sink = Arc::new(Mutex::new(sink));
    let span = tracing::info_span!("ws_session", conn_id = %session.id());
    tracing::debug!(parent: &span, "websocket session started");

    let read = spawn_path(
        "read",
        session.close.clone(),
        span.clone(),
        read_loop(Arc::clone(&session), stream),
    );
    let write = spawn_path(
        "write",
        session.close.clone(),
        span.clone(),
        write_loop(Arc::clone(&sink), outbound_rx, session.close.clone(), config),
    );
    let shutdown = spawn_path(
        "shutdown",
        session.close.clone(),
        span.clone(),
        shutdown(session, sink, read, config.close_timeout),
    );

    let (write, shutdown) = tokio::join!(write, shutdown);
    for (path, result) in [("write", write), ("shutdown", shutdown)] {
        if let Err(e) = result {
            tracing::warn!(parent: &span, path, error = %e, "session task did not complete");
        }
    }
}

/// Receives frames until the transport fails, the peer closes, or close
/// is requested elsewhere.
async fn read_loop<St, E>(session: Arc<Session>, mut stream: St)
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    loop {
        let frame = tokio::select! {
            () = session.close.cancelled() => break,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => session.handle_message(text.as_bytes()).await,
            Some(Ok(Message::Binary(bytes))) => session.handle_message(&bytes).await,
            Some(Ok(Message::Close(frame))) => {
                let code = frame.as_ref().map(|f| f.code);
                if code.is_none_or(is_expected_close) {
                    tracing::debug!(?code, "peer closed connection");
                } else {
                    tracing::warn!(?code, "unexpected close, shutting down ws");
                }
                break;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "websocket read failed, shutting down ws");
                break;
            }
            None => {
                tracing::debug!("websocket stream ended");
                break;
            }
        }
    }
    session.request_close();
}

/// Drains the outbound queue and sends keepalive pings until the queue
/// closes or a write fails. Always releases the socket on exit.
async fn write_loop<Si>(
    sink: SharedSink<Si>,
    mut outbound: OutboundReceiver,
    close: CancellationToken,
    config: SessionConfig,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    let mut ticker =
        tokio::time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            message = outbound.recv() => match message {
                Some(text) => Message::text(text),
                None => {
                    tracing::debug!("outbound queue closed");
                    break;
                }
            },
            _ = ticker.tick() => Message::Ping(Bytes::new()),
        };

        if let Err(e) = send_with_deadline(&sink, message, config.write_timeout).await {
            tracing::warn!(error = %e, "failed to write websocket message");
            break;
        }
    }

    if let Err(e) = sink.lock().await.close().await {
        tracing::debug!(error = %e, "websocket already released");
    }
    close.cancel();
}

/// Waits for the close signal, then runs the cleanup sequence exactly
/// once. A failing step is logged and the remaining steps still run.
async fn shutdown<Si>(
    session: Arc<Session>,
    sink: SharedSink<Si>,
    read_path: JoinHandle<()>,
    close_timeout: Duration,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    session.close.cancelled().await;

    let close_frame = Message::Close(Some(CloseFrame {
        code: close_code::NORMAL,
        reason: Utf8Bytes::from_static("closing"),
    }));
    if let Err(e) = send_with_deadline(&sink, close_frame, close_timeout).await {
        tracing::debug!(error = %e, "failed to send close frame");
    }

    match tokio::time::timeout(close_timeout, async { sink.lock().await.close().await }).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "failed to release websocket"),
        Err(_) => tracing::warn!("timed out releasing websocket"),
    }

    session.outbound.close();

    // The read path is the only writer of the subscription slot.
    if let Err(e) = read_path.await {
        tracing::warn!(error = %e, "read path did not complete");
    }

    if let Some(subscription) = session.subscription() {
        session.service.deactivate(subscription).await;
    }

    tracing::info!("websocket conn ended");
}

/// Failure of a single bounded write.
#[derive(Debug)]
enum WriteError<E> {
    Transport(E),
    Timeout(Duration),
}

impl<E: fmt::Display> fmt::Display for WriteError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::Timeout(after) => write!(f, "write timed out after {after:?}"),
        }
    }
}

async fn send_with_deadline<Si>(
    sink: &SharedSink<Si>,
    message: Message,
    deadline: Duration,
) -> Result<(), WriteError<Si::Error>>
where
    Si: Sink<Message> + Unpin,
{
    match tokio::time::timeout(deadline, async { sink.lock().await.send(message).await }).await {
        Ok(result) => result.map_err(WriteError::Transport),
        Err(_) => Err(WriteError::Timeout(deadline)),
    }
}

/// Close codes that end a session without being worth a warning.
fn is_expected_close(code: u16) -> bool {
    matches!(
        code,
        close_code::NORMAL | close_code::AWAY | close_code::STATUS | close_code::ABNORMAL
    )
}

/// Spawns one session path behind a panic boundary. A panic is logged
/// and turned into a close request.
fn spawn_path<F>(
    path: &'static str,
    close: CancellationToken,
    span: tracing::Span,
    fut: F,
) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(
        async move {
            if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                tracing::error!(
                    path,
                    panic = %panic_message(panic.as_ref()),
                    "recovered from panic in session path"
                );
                close.cancel();
            }
        }
        .instrument(span),
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
