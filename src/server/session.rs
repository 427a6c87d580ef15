//! Per-frame command handling.
//!
//! Turns a decoded frame into registry and engine calls and answers with a
//! `result` (or a fatal `error`). Replies are queued before any sweep runs,
//! so a client always sees `result` for a lock before its `locked`.

use super::connection::ConnId;
use super::coordinator::{Coordinator, Flow};
use super::engine::LockRequest;
use crate::error::HandshakeError;
use crate::protocol::{ClientCommand, ServerMessage};

impl Coordinator {
    /// Handle one frame from `conn_id`.
    pub(crate) fn handle_frame(&mut self, conn_id: ConnId, payload: &[u8], now: u64) -> Flow {
        if !self.registry.is_registered(conn_id) {
            log::debug!("[Session] Dropping frame from closed connection {}", conn_id);
            return Flow::Idle;
        }

        let command = match ClientCommand::parse(payload) {
            Ok(command) => command,
            Err(e) => {
                log::warn!("[Session] Connection {} sent an invalid frame: {e}", conn_id);
                let error = if self.registry.identity_of(conn_id).is_none() {
                    HandshakeError::NotConnected
                } else {
                    HandshakeError::InvalidMessage
                };
                self.registry.close_with_error(conn_id, &error);
                return Flow::Idle;
            }
        };

        if let ClientCommand::Connect { socket_id, api_version } = command {
            self.handle_connect(conn_id, socket_id, api_version, now);
            return Flow::Idle;
        }

        let Some(owner) = self.registry.identity_of(conn_id).map(str::to_string) else {
            self.registry.close_with_error(conn_id, &HandshakeError::NotConnected);
            return Flow::Idle;
        };

        let (request_id, outcome, flow) = match command {
            ClientCommand::Lock { request_id, resources, ttl, timeout, tolerate } => {
                let request = LockRequest { resources, ttl, timeout, tolerate };
                let outcome = self
                    .engine
                    .request_lock(&owner, request, now)
                    .map(|lock_id| lock_id.0);
                (request_id, outcome, Flow::Sweep)
            }
            ClientCommand::Extend { request_id, lock_id, ttl } => {
                let outcome = self
                    .engine
                    .extend_lock(&lock_id, ttl)
                    .map(|expires_at| expires_at.to_string());
                (request_id, outcome, Flow::Sweep)
            }
            ClientCommand::Unlock { request_id, lock_id } => {
                let outcome = self
                    .engine
                    .release_lock(&lock_id)
                    .map(|()| "done".to_string());
                (request_id, outcome, Flow::Sweep)
            }
            ClientCommand::Status { request_id } => {
                let status = self.engine.status(self.registry.identity_count(), now);
                let outcome = serde_json::to_string(&status).map_err(|e| e.to_string());
                self.registry
                    .send(conn_id, &ServerMessage::result(&request_id, outcome));
                return Flow::Idle;
            }
            ClientCommand::Ping { request_id } => {
                self.registry
                    .send(conn_id, &ServerMessage::result(&request_id, Ok("pong".into())));
                return Flow::Idle;
            }
            ClientCommand::Connect { .. } => return Flow::Idle,
        };

        if let Err(e) = &outcome {
            log::debug!("[Session] {} request {} failed: {e}", owner, request_id);
        }
        let outcome = outcome.map_err(|e| e.to_string());
        self.registry
            .send(conn_id, &ServerMessage::result(&request_id, outcome));
        flow
    }

    fn handle_connect(
        &mut self,
        conn_id: ConnId,
        socket_id: Option<String>,
        api_version: Option<String>,
        now: u64,
    ) {
        match self.registry.bind(conn_id, socket_id, api_version, now) {
            Ok(0) => {}
            Ok(replayed) => {
                log::info!("[Session] Replayed {} offline message(s) to connection {}", replayed, conn_id);
            }
            Err(e) => {
                log::info!("[Session] Rejecting connect on {}: {e}", conn_id);
                self.registry.close_with_error(conn_id, &e);
            }
        }
    }
}
