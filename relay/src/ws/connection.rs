//! WebSocket connection state management.
//!
//! A [`Connection`] is the registry's handle on one accepted socket: its
//! identity, its lifecycle state and a bounded outbound queue drained by
//! the socket's writer task.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{mpsc, Notify};

/// Global connection ID counter.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique connection ID.
#[must_use]
pub fn next_connection_id() -> u64 {
    CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Handshake not finished.
    Connecting = 0,
    /// Registered and receiving broadcasts.
    Open = 1,
    /// Teardown started.
    Closing = 2,
    /// Gone.
    Closed = 3,
}

impl ConnectionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Why a send to a connection did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The connection is not open.
    #[error("connection is not open")]
    NotOpen,
    /// The outbound queue is full; the peer is not keeping up.
    #[error("outbound queue full")]
    Full,
    /// The writer task has gone away.
    #[error("writer closed")]
    Closed,
}

/// One socket attached to the relay.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    remote_addr: String,
    state: AtomicU8,
    sender: mpsc::Sender<Utf8Bytes>,
    close_requested: Notify,
}

impl Connection {
    /// Creates a new connection in the `Connecting` state.
    #[must_use]
    pub fn new(remote_addr: impl Into<String>, sender: mpsc::Sender<Utf8Bytes>) -> Self {
        Self {
            id: next_connection_id(),
            remote_addr: remote_addr.into(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            sender,
            close_requested: Notify::new(),
        }
    }

    /// Returns the connection ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the remote address.
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns true if the connection is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Sets the state.
    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Queues a frame without waiting.
    ///
    /// # Errors
    ///
    /// Fails if the connection is not open, its queue is full or its
    /// writer has stopped.
    pub fn send(&self, text: Utf8Bytes) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }

        self.sender.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Asks the connection's task to tear the socket down.
    pub fn close(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Open as u8,
            ConnectionState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.close_requested.notify_one();
    }

    /// Resolves once [`Connection::close`] has been called.
    pub async fn closed(&self) {
        self.close_requested.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_connection_id() {
        let id1 = next_connection_id();
        let id2 = next_connection_id();
        assert!(id2 > id1);
    }

    #[tokio::test]
    async fn test_connection_new() {
        let (tx, _rx) = mpsc::channel(10);
        let conn = Connection::new("10.0.0.1", tx);
        assert!(conn.id() > 0);
        assert_eq!(conn.remote_addr(), "10.0.0.1");
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_connection_send_requires_open() {
        let (tx, mut rx) = mpsc::channel(10);
        let conn = Connection::new("10.0.0.1", tx);

        assert_eq!(conn.send("early".into()), Err(SendError::NotOpen));

        conn.set_state(ConnectionState::Open);
        assert!(conn.send("hello".into()).is_ok());

        let msg = rx.recv().await.expect("queued");
        assert_eq!(msg.as_str(), "hello");
    }

    #[tokio::test]
    async fn test_connection_send_full() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new("10.0.0.1", tx);
        conn.set_state(ConnectionState::Open);

        assert!(conn.send("one".into()).is_ok());
        assert_eq!(conn.send("two".into()), Err(SendError::Full));
    }

    #[tokio::test]
    async fn test_connection_send_writer_gone() {
        let (tx, rx) = mpsc::channel(10);
        let conn = Connection::new("10.0.0.1", tx);
        conn.set_state(ConnectionState::Open);
        drop(rx);

        assert_eq!(conn.send("lost".into()), Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_connection_close() {
        let (tx, _rx) = mpsc::channel(10);
        let conn = Connection::new("10.0.0.1", tx);
        conn.set_state(ConnectionState::Open);

        conn.close();

        assert_eq!(conn.state(), ConnectionState::Closing);
        // The permit is stored, so a later waiter still wakes.
        tokio::time::timeout(std::time::Duration::from_secs(1), conn.closed())
            .await
            .expect("close observed");
    }
}
