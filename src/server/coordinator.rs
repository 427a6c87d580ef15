//! Coordinator task: the single owner of lock and connection state.
//!
//! Connection tasks and auth timers feed [`ServerEvent`]s into one unbounded
//! channel. The coordinator applies them in arrival order, so a request's
//! enqueue-or-rollback and every sweep run without interleaving.
//!
//! Sweeps are coalesced into one timer: after every event that mutates lock
//! state the coordinator sweeps immediately and re-arms the timer for the
//! earliest upcoming deadline (or the fallback interval when there is none).

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::connection::{ClientConn, ConnId};
use super::engine::LockEngine;
use super::registry::ConnectionRegistry;
use crate::clock;
use crate::config::ServerConfig;
use crate::error::HandshakeError;

/// Events consumed by the coordinator.
pub(crate) enum ServerEvent {
    /// A TCP connection was accepted.
    Opened {
        /// The new connection.
        conn: ClientConn,
    },
    /// A complete frame arrived.
    Frame {
        /// Source connection.
        conn_id: ConnId,
        /// Frame payload.
        payload: Vec<u8>,
    },
    /// The transport closed (EOF, read error or bad framing).
    Closed {
        /// Connection that closed.
        conn_id: ConnId,
    },
    /// The handshake grace period of a connection ran out.
    AuthDeadline {
        /// Connection whose timer fired.
        conn_id: ConnId,
    },
}

impl std::fmt::Debug for ServerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened { conn } => write!(f, "Opened({})", conn.id()),
            Self::Frame { conn_id, payload } => {
                write!(f, "Frame({conn_id}, {} bytes)", payload.len())
            }
            Self::Closed { conn_id } => write!(f, "Closed({conn_id})"),
            Self::AuthDeadline { conn_id } => write!(f, "AuthDeadline({conn_id})"),
        }
    }
}

/// What the run loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Lock state untouched.
    Idle,
    /// Lock state changed; sweep now.
    Sweep,
}

/// Owns the [`LockEngine`] and [`ConnectionRegistry`].
#[derive(Debug)]
pub(crate) struct Coordinator {
    pub(super) engine: LockEngine,
    pub(super) registry: ConnectionRegistry,
    config: ServerConfig,
    event_tx: UnboundedSender<ServerEvent>,
}

impl Coordinator {
    /// Create a coordinator. `event_tx` feeds auth deadlines back into the
    /// event channel.
    pub(crate) fn new(config: ServerConfig, event_tx: UnboundedSender<ServerEvent>) -> Self {
        Self {
            engine: LockEngine::new(clock::now_ms()),
            registry: ConnectionRegistry::new(config.offline_retention()),
            config,
            event_tx,
        }
    }

    /// Run until `cancel` fires, then drop all state and close every
    /// connection.
    pub(crate) async fn run(
        mut self,
        mut event_rx: UnboundedReceiver<ServerEvent>,
        cancel: CancellationToken,
    ) {
        let mut next_sweep = Instant::now() + self.config.sweep_interval();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    if self.handle_event(event) == Flow::Sweep {
                        next_sweep = self.sweep(clock::now_ms());
                    }
                }
                _ = tokio::time::sleep_until(next_sweep) => {
                    next_sweep = self.sweep(clock::now_ms());
                }
            }
        }

        self.stop();
        log::info!("[Server] Coordinator stopped");
    }

    /// Apply one event.
    pub(crate) fn handle_event(&mut self, event: ServerEvent) -> Flow {
        match event {
            ServerEvent::Opened { conn } => {
                log::debug!("[Server] Connection {} opened from {}", conn.id(), conn.peer());
                let timer = self.spawn_auth_timer(conn.id());
                self.registry.register(conn, Some(timer));
                Flow::Idle
            }
            ServerEvent::Frame { conn_id, payload } => {
                self.handle_frame(conn_id, &payload, clock::now_ms())
            }
            ServerEvent::Closed { conn_id } => {
                self.registry.disconnect(conn_id);
                Flow::Idle
            }
            ServerEvent::AuthDeadline { conn_id } => {
                if self.registry.is_registered(conn_id)
                    && self.registry.identity_of(conn_id).is_none()
                {
                    log::info!("[Server] Connection {} did not authenticate in time", conn_id);
                    self.registry.close_with_error(conn_id, &HandshakeError::AuthTimeout);
                }
                Flow::Idle
            }
        }
    }

    fn spawn_auth_timer(&self, conn_id: ConnId) -> tokio::task::JoinHandle<()> {
        let event_tx = self.event_tx.clone();
        let grace = self.config.auth_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = event_tx.send(ServerEvent::AuthDeadline { conn_id });
        })
    }

    /// Run one engine sweep, deliver its notifications and return when the
    /// next sweep is due.
    pub(crate) fn sweep(&mut self, now: u64) -> Instant {
        let sweep = self.engine.sweep(now);
        for notification in sweep.notifications {
            self.registry
                .send_to_identity(&notification.socket_id, notification.message, now);
        }
        self.registry.prune_offline(now);

        let fallback = self.config.sweep_interval();
        let delay = match sweep.next_deadline {
            Some(deadline) => Duration::from_millis(deadline.saturating_sub(now)),
            None => fallback,
        };
        let base = Instant::now();
        base.checked_add(delay).unwrap_or(base + fallback)
    }

    /// Drop every lock, buffered message and connection.
    pub(crate) fn stop(&mut self) {
        self.engine.clear();
        self.registry.close_all();
    }
}
