//! Per-connection transport state (server side).
//!
//! Each accepted TCP connection gets a `ClientConn` that owns a read task
//! and a write task and translates between frames and [`ServerEvent`]s.
//! Lock state never lives here; the read task only forwards raw payloads
//! to the coordinator.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::coordinator::ServerEvent;
use crate::constants::READ_BUFFER_SIZE;
use crate::framing::{encode_frame, FrameDecoder};
use crate::protocol::ServerMessage;

/// Server-assigned id of a transport connection.
///
/// Distinct from the client-chosen socket id, which survives reconnects.
pub type ConnId = u64;

/// Instructions for the write task.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// Encoded frame bytes.
    Frame(Vec<u8>),
    /// Flush what is queued, then shut the socket down.
    Close,
}

/// Coordinator-side handle to a single client connection.
///
/// Dropping it closes the connection: queued frames are flushed, the write
/// half is shut down and the read task is aborted.
pub struct ClientConn {
    conn_id: ConnId,
    peer: String,
    outbound_tx: UnboundedSender<Outbound>,
    read_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ClientConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConn")
            .field("conn_id", &self.conn_id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl ClientConn {
    /// Wrap an accepted stream and spawn its read and write tasks.
    pub(crate) fn spawn(
        conn_id: ConnId,
        stream: TcpStream,
        peer: String,
        event_tx: UnboundedSender<ServerEvent>,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Outbound>();

        tokio::spawn(Self::write_loop(conn_id, write_half, outbound_rx));
        let read_handle = tokio::spawn(Self::read_loop(conn_id, read_half, event_tx));

        let mut conn = Self::from_channel(conn_id, peer, outbound_tx);
        conn.read_handle = Some(read_handle);
        conn
    }

    /// Build a connection whose outbound frames go to `outbound_tx`.
    ///
    /// No socket is involved; the receiver side decides what happens to
    /// the frames.
    pub(crate) fn from_channel(
        conn_id: ConnId,
        peer: String,
        outbound_tx: UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            conn_id,
            peer,
            outbound_tx,
            read_handle: None,
        }
    }

    /// Queue a message for this client.
    ///
    /// Returns `false` if the write task is gone (client disconnected).
    pub fn send(&self, message: &ServerMessage) -> bool {
        let line = message.to_line();
        log::debug!("[Conn {}] send: {}", self.conn_id, line);
        self.outbound_tx
            .send(Outbound::Frame(encode_frame(line.as_bytes())))
            .is_ok()
    }

    /// Connection id.
    pub fn id(&self) -> ConnId {
        self.conn_id
    }

    /// Remote address, for logging.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Read loop: decodes frames and forwards payloads to the coordinator.
    async fn read_loop(
        conn_id: ConnId,
        mut reader: OwnedReadHalf,
        event_tx: UnboundedSender<ServerEvent>,
    ) {
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    log::debug!("[Conn {}] EOF", conn_id);
                    break;
                }
                Ok(n) => {
                    log::trace!("[Conn {}] received {} bytes", conn_id, n);
                    match decoder.feed(&buf[..n]) {
                        Ok(frames) => {
                            for payload in frames {
                                if event_tx.send(ServerEvent::Frame { conn_id, payload }).is_err() {
                                    return; // Coordinator gone
                                }
                            }
                        }
                        Err(e) => {
                            log::warn!("[Conn {}] Frame decode error: {e}", conn_id);
                            break;
                        }
                    }
                }
                Err(e) => {
                    log::debug!("[Conn {}] Read error: {e}", conn_id);
                    break;
                }
            }
        }

        let _ = event_tx.send(ServerEvent::Closed { conn_id });
    }

    /// Write loop: drains queued frames into the socket.
    async fn write_loop(
        conn_id: ConnId,
        mut writer: OwnedWriteHalf,
        mut outbound_rx: UnboundedReceiver<Outbound>,
    ) {
        while let Some(outbound) = outbound_rx.recv().await {
            match outbound {
                Outbound::Frame(data) => {
                    if let Err(e) = writer.write_all(&data).await {
                        log::debug!("[Conn {}] Write error: {e}", conn_id);
                        return;
                    }
                }
                Outbound::Close => break,
            }
        }
        let _ = writer.shutdown().await;
    }
}

impl Drop for ClientConn {
    fn drop(&mut self) {
        let _ = self.outbound_tx.send(Outbound::Close);
        if let Some(handle) = self.read_handle.take() {
            handle.abort();
        }
    }
}
