//! Bounded outbound message queue with an explicit close.
//!
//! The read path pushes serialized responses; the write path drains them
//! onto the socket. Pushing into a full queue waits for the writer. Once
//! the queue is closed, pending and future pushes return immediately and
//! the receiver yields `None`.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Sending half, held by the session.
#[derive(Debug)]
pub struct OutboundQueue {
    tx: mpsc::Sender<String>,
    closed: CancellationToken,
}

/// Receiving half, owned by the write path.
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::Receiver<String>,
    closed: CancellationToken,
}

impl OutboundQueue {
    /// Creates a queue holding at most `capacity` messages.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = CancellationToken::new();
        (
            Self {
                tx,
                closed: closed.clone(),
            },
            OutboundReceiver { rx, closed },
        )
    }

    /// Queues a message, waiting while the queue is full.
    ///
    /// Returns `false` if the message was dropped because the queue is
    /// closed or the receiver is gone.
    pub async fn push(&self, message: String) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        tokio::select! {
            sent = self.tx.send(message) => sent.is_ok(),
            () = self.closed.cancelled() => false,
        }
    }

    /// Closes the queue. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Returns `true` once [`OutboundQueue::close`] has been called.
    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl OutboundReceiver {
    /// Waits for the next message; `None` once the queue is closed.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            () = self.closed.cancelled() => None,
            message = self.rx.recv() => message,
        }
    }
}
