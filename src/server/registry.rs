//! Connection registry: client identities, live connections, offline buffer.
//!
//! A client identity (`socketId`) is chosen by the client and survives
//! reconnects. The registry tracks three states per identity:
//!
//! ```text
//! Unknown ──connect──► Connected(conn) ──transport closed──► Disconnected
//!                            ▲                                   │
//!                            └──────────── connect ──────────────┘
//!                                   (offline messages replayed)
//! ```
//!
//! Messages for a Disconnected identity are buffered for the retention
//! window and replayed in FIFO order on reconnect.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::connection::{ClientConn, ConnId};
use crate::constants::API_VERSION;
use crate::error::HandshakeError;
use crate::protocol::ServerMessage;

/// Where an identity currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Never seen.
    Unknown,
    /// Seen before, no live connection right now.
    Disconnected,
    /// Bound to a live connection.
    Connected(ConnId),
}

#[derive(Debug)]
struct OfflineMessage {
    socket_id: String,
    enqueued_at: u64,
    message: ServerMessage,
}

#[derive(Debug)]
struct ConnectionEntry {
    conn: ClientConn,
    identity: Option<String>,
    auth_timer: Option<JoinHandle<()>>,
}

/// Maps identities to live connections and buffers undeliverable messages.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnId, ConnectionEntry>,
    identities: HashMap<String, Option<ConnId>>,
    offline: VecDeque<OfflineMessage>,
    retention_ms: u64,
}

impl ConnectionRegistry {
    /// Create an empty registry with the given offline retention window.
    pub fn new(retention: Duration) -> Self {
        Self {
            connections: HashMap::new(),
            identities: HashMap::new(),
            offline: VecDeque::new(),
            retention_ms: retention.as_millis() as u64,
        }
    }

    /// Track a freshly accepted, still anonymous connection.
    pub fn register(&mut self, conn: ClientConn, auth_timer: Option<JoinHandle<()>>) {
        self.connections.insert(
            conn.id(),
            ConnectionEntry {
                conn,
                identity: None,
                auth_timer,
            },
        );
    }

    /// Whether the connection is still tracked.
    pub fn is_registered(&self, conn_id: ConnId) -> bool {
        self.connections.contains_key(&conn_id)
    }

    /// Identity bound to a connection, if the handshake completed.
    pub fn identity_of(&self, conn_id: ConnId) -> Option<&str> {
        self.connections.get(&conn_id)?.identity.as_deref()
    }

    /// Three-state lookup of an identity.
    pub fn presence(&self, socket_id: &str) -> Presence {
        match self.identities.get(socket_id) {
            None => Presence::Unknown,
            Some(None) => Presence::Disconnected,
            Some(Some(conn_id)) => Presence::Connected(*conn_id),
        }
    }

    /// Complete the handshake for `conn_id`.
    ///
    /// On success acknowledges with `connected`, then replays buffered
    /// messages for the identity. Returns how many were replayed.
    pub fn bind(
        &mut self,
        conn_id: ConnId,
        socket_id: Option<String>,
        api_version: Option<String>,
        now: u64,
    ) -> Result<usize, HandshakeError> {
        let entry = self
            .connections
            .get(&conn_id)
            .ok_or(HandshakeError::NotConnected)?;
        if entry.identity.is_some() {
            return Err(HandshakeError::DuplicateConnect);
        }
        let socket_id = socket_id.ok_or(HandshakeError::MissingField("socketId"))?;
        api_version.ok_or(HandshakeError::MissingField("apiVersion"))?;

        match self.presence(&socket_id) {
            Presence::Connected(_) => return Err(HandshakeError::Conflict),
            Presence::Disconnected => {
                log::info!("[Registry] Reconnected {} as {}", entry.conn.peer(), socket_id);
            }
            Presence::Unknown => {
                log::info!("[Registry] Connected {} as {}", entry.conn.peer(), socket_id);
            }
        }

        let Some(entry) = self.connections.get_mut(&conn_id) else {
            return Err(HandshakeError::NotConnected);
        };
        if let Some(timer) = entry.auth_timer.take() {
            timer.abort();
        }
        entry.identity = Some(socket_id.clone());
        self.identities.insert(socket_id.clone(), Some(conn_id));

        entry.conn.send(&ServerMessage::Connected {
            api_version: API_VERSION.to_string(),
        });

        let retention_ms = self.retention_ms;
        let mut replayed = 0;
        let conn = &entry.conn;
        self.offline.retain(|msg| {
            if now.saturating_sub(msg.enqueued_at) > retention_ms {
                return false;
            }
            if msg.socket_id != socket_id {
                return true;
            }
            conn.send(&msg.message);
            replayed += 1;
            false
        });

        Ok(replayed)
    }

    /// Send to a specific connection. Returns `false` if it is gone.
    pub fn send(&self, conn_id: ConnId, message: &ServerMessage) -> bool {
        self.connections
            .get(&conn_id)
            .is_some_and(|entry| entry.conn.send(message))
    }

    /// Deliver to an identity now, or buffer it until the identity
    /// reconnects.
    pub fn send_to_identity(&mut self, socket_id: &str, message: ServerMessage, now: u64) {
        if let Presence::Connected(conn_id) = self.presence(socket_id) {
            if self.send(conn_id, &message) {
                return;
            }
        }
        log::debug!("[Registry] Buffering for offline {}: {}", socket_id, message.to_line());
        self.offline.push_back(OfflineMessage {
            socket_id: socket_id.to_string(),
            enqueued_at: now,
            message,
        });
    }

    /// Drop buffered messages older than the retention window.
    pub fn prune_offline(&mut self, now: u64) {
        while self
            .offline
            .front()
            .is_some_and(|msg| now.saturating_sub(msg.enqueued_at) > self.retention_ms)
        {
            self.offline.pop_front();
        }
    }

    /// Number of buffered offline messages.
    pub fn offline_len(&self) -> usize {
        self.offline.len()
    }

    /// Send `error <message>` and close the connection.
    pub fn close_with_error(&mut self, conn_id: ConnId, error: &HandshakeError) {
        self.send(
            conn_id,
            &ServerMessage::Error {
                message: error.to_string(),
            },
        );
        self.disconnect(conn_id);
    }

    /// Forget a connection; its identity (if any) becomes Disconnected.
    ///
    /// Returns the identity that was bound to it.
    pub fn disconnect(&mut self, conn_id: ConnId) -> Option<String> {
        let mut entry = self.connections.remove(&conn_id)?;
        if let Some(timer) = entry.auth_timer.take() {
            timer.abort();
        }
        let identity = entry.identity.take()?;
        if let Some(slot) = self.identities.get_mut(&identity) {
            if *slot == Some(conn_id) {
                *slot = None;
            }
        }
        log::info!("[Registry] Disconnected {} ({})", identity, entry.conn.peer());
        Some(identity)
    }

    /// Known identities, connected or not.
    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    /// Live transport connections, identified or not.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Close every connection and forget all identities and buffered
    /// messages.
    pub fn close_all(&mut self) {
        for (_, mut entry) in self.connections.drain() {
            if let Some(timer) = entry.auth_timer.take() {
                timer.abort();
            }
        }
        self.identities.clear();
        self.offline.clear();
    }
}
