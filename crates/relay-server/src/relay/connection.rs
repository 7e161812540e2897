//! Connection handles shared between a connection's task and the relay
//! collections.
//!
//! A handle never owns the transport. It holds the sending half of the
//! connection's outbound queue; a dedicated writer task drains the queue into
//! the socket. Sends are `try_send`, so routing never waits on another
//! connection's I/O.

use relay_core::short_identity;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Process-unique connection identifier.
pub type ConnectionId = u64;

/// Result of a single best-effort send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Dropped(SendFailure),
}

/// Why a send did not reach the outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The connection was marked closed or its writer is gone.
    Closed,
    /// The outbound queue is full.
    QueueFull,
}

/// A handle to one client connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: Option<SocketAddr>,
    open: AtomicBool,
    tx: mpsc::Sender<Message>,
}

impl Connection {
    /// Wrap the sending half of an outbound queue.
    pub fn new(
        id: ConnectionId,
        remote_addr: Option<SocketAddr>,
        tx: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            id,
            remote_addr,
            open: AtomicBool::new(true),
            tx,
        }
    }

    /// Create a handle together with its outbound queue receiver.
    pub fn channel(
        id: ConnectionId,
        remote_addr: Option<SocketAddr>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(id, remote_addr, tx)), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Whether the connection can still accept sends.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Mark the connection closed. Returns `true` if it was open.
    pub fn mark_closed(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    /// Queue a text frame.
    pub fn send_text(&self, frame: &str) -> Delivery {
        self.send_frame(Message::text(frame))
    }

    /// Queue a raw WebSocket frame.
    pub fn send_frame(&self, message: Message) -> Delivery {
        if !self.open.load(Ordering::Acquire) {
            return Delivery::Dropped(SendFailure::Closed);
        }
        match self.tx.try_send(message) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped(SendFailure::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Dropped(SendFailure::Closed),
        }
    }
}

/// An identity bound to a connection via `auth` or `register`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundIdentity {
    /// The identity as the client declared it.
    pub declared: String,
    /// Normalized registry key.
    pub key: String,
}

impl BoundIdentity {
    pub fn short(&self) -> &str {
        short_identity(&self.declared)
    }
}

/// Per-connection state owned by the connection's task.
#[derive(Debug)]
pub struct ConnectionContext {
    /// Handle shared with the registry and rooms.
    pub conn: Arc<Connection>,
    /// Identity label, set once the client declares one.
    pub identity: Option<BoundIdentity>,
}

impl ConnectionContext {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self {
            conn,
            identity: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_reaches_queue() {
        let (conn, mut rx) = Connection::channel(1, None, 4);
        assert!(conn.is_open());
        assert_eq!(conn.send_text("hello"), Delivery::Delivered);
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.to_text().unwrap(), "hello");
    }

    #[test]
    fn closed_connection_drops() {
        let (conn, _rx) = Connection::channel(1, None, 4);
        assert!(conn.mark_closed());
        assert!(!conn.mark_closed());
        assert!(!conn.is_open());
        assert_eq!(
            conn.send_text("x"),
            Delivery::Dropped(SendFailure::Closed)
        );
    }

    #[test]
    fn dropped_receiver_counts_as_closed() {
        let (conn, rx) = Connection::channel(1, None, 4);
        drop(rx);
        assert!(!conn.is_open());
        assert_eq!(
            conn.send_text("x"),
            Delivery::Dropped(SendFailure::Closed)
        );
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (conn, _rx) = Connection::channel(1, None, 1);
        assert_eq!(conn.send_text("a"), Delivery::Delivered);
        assert_eq!(
            conn.send_text("b"),
            Delivery::Dropped(SendFailure::QueueFull)
        );
        assert!(conn.is_open());
    }
}
