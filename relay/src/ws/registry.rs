//! Connection registry and broadcast fan-out.
//!
//! The registry is the only shared mutable state in the relay. Membership
//! changes take the write lock; a broadcast copies the member list under
//! the read lock and sends outside of it, so a slow peer never holds up
//! registration or other broadcasts.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::Connection;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members the frame was queued for.
    pub delivered: usize,
    /// Members skipped because they were not open.
    pub skipped: usize,
    /// Members whose send failed and were unregistered.
    pub dropped: usize,
}

/// The set of open connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<u64, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a connection.
    pub async fn register(&self, connection: Arc<Connection>) {
        let id = connection.id();
        self.connections.write().await.insert(id, connection);
        debug!(connection_id = id, "registered");
    }

    /// Removes a connection. Removing an absent connection is a no-op.
    ///
    /// Returns true if the connection was a member.
    pub async fn unregister(&self, connection_id: u64) -> bool {
        let removed = self.connections.write().await.remove(&connection_id);
        if removed.is_some() {
            debug!(connection_id, "unregistered");
        }
        removed.is_some()
    }

    /// Returns true if the connection is a member.
    pub async fn contains(&self, connection_id: u64) -> bool {
        self.connections.read().await.contains_key(&connection_id)
    }

    /// Returns the number of members.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns true if there are no members.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Returns a copy of the current membership.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Sends `text` verbatim to every open member, the sender included.
    ///
    /// Members that are not open are skipped. A member whose send fails
    /// is closed and unregistered; the failure is not reported to the
    /// caller beyond the returned counts.
    pub async fn broadcast(&self, text: &Utf8Bytes) -> BroadcastReport {
        let members = self.snapshot().await;
        let mut report = BroadcastReport::default();
        let mut stale = Vec::new();

        for connection in &members {
            if !connection.is_open() {
                report.skipped += 1;
                continue;
            }

            match connection.send(text.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        connection_id = connection.id(),
                        remote_addr = connection.remote_addr(),
                        "dropping stale peer: {}",
                        e
                    );
                    connection.close();
                    stale.push(connection.id());
                }
            }
        }

        if !stale.is_empty() {
            let mut connections = self.connections.write().await;
            for id in &stale {
                if connections.remove(id).is_some() {
                    report.dropped += 1;
                }
            }
        }

        report
    }

    /// Closes and removes every member.
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Connection>> = self
            .connections
            .write()
            .await
            .drain()
            .map(|(_, connection)| connection)
            .collect();

        for connection in drained {
            connection.close();
        }
    }
}
