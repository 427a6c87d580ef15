//! TCP lock server.
//!
//! [`LockServer::start`] binds a listener and spawns two tasks: the accept
//! loop, which wraps each stream in a [`ClientConn`](connection::ClientConn)
//! and announces it, and the coordinator, which owns every lock and
//! connection and processes events one at a time.
//!
//! ```text
//! accept loop ──Opened──┐
//! conn read tasks ──Frame/Closed──► coordinator ──► engine + registry
//! auth timers ──AuthDeadline──┘
//! ```

pub mod connection;
pub(crate) mod coordinator;
pub mod engine;
pub mod registry;
mod session;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use connection::{ClientConn, ConnId};
use coordinator::{Coordinator, ServerEvent};

pub use engine::{Counters, LockEngine, LockRequest, LockState, ServerStatus};
pub use registry::{ConnectionRegistry, Presence};

/// A running lock server.
///
/// Dropping it stops the server without waiting; prefer
/// [`LockServer::shutdown`].
#[derive(Debug)]
pub struct LockServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    accept_handle: Option<JoinHandle<()>>,
    coordinator_handle: Option<JoinHandle<()>>,
}

impl LockServer {
    /// Bind the listener and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let bind_addr = config.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("Failed to bind lock server on {bind_addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read listener address")?;

        log::info!("[Server] Listening on {}", local_addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel::<ServerEvent>();
        let cancel = CancellationToken::new();

        let coordinator = Coordinator::new(config, event_tx.clone());
        let coordinator_handle = tokio::spawn(coordinator.run(event_rx, cancel.clone()));
        let accept_handle = tokio::spawn(Self::accept_loop(listener, event_tx, cancel.clone()));

        Ok(Self {
            local_addr,
            cancel,
            accept_handle: Some(accept_handle),
            coordinator_handle: Some(coordinator_handle),
        })
    }

    /// Address the listener is bound to (useful with port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every connection, drop all lock state and wait
    /// for both tasks to finish.
    pub async fn shutdown(mut self) {
        log::info!("[Server] Shutting down");
        self.cancel.cancel();
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.coordinator_handle.take() {
            let _ = handle.await;
        }
    }

    async fn accept_loop(
        listener: TcpListener,
        event_tx: UnboundedSender<ServerEvent>,
        cancel: CancellationToken,
    ) {
        let mut next_conn_id: ConnId = 0;

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    next_conn_id += 1;
                    if let Err(e) = stream.set_nodelay(true) {
                        log::debug!("[Server] set_nodelay failed for {peer}: {e}");
                    }
                    let conn =
                        ClientConn::spawn(next_conn_id, stream, peer.to_string(), event_tx.clone());
                    if event_tx.send(ServerEvent::Opened { conn }).is_err() {
                        log::warn!("[Server] Coordinator gone, stopping accept loop");
                        break;
                    }
                }
                Err(e) => {
                    log::error!("[Server] Accept error: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }

        log::debug!("[Server] Accept loop stopped");
    }
}

impl Drop for LockServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{encode_frame, FrameDecoder};
    use crate::protocol::ServerMessage;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    struct RawClient {
        stream: TcpStream,
        decoder: FrameDecoder,
    }

    impl RawClient {
        async fn connect(addr: SocketAddr) -> Self {
            Self {
                stream: TcpStream::connect(addr).await.unwrap(),
                decoder: FrameDecoder::new(),
            }
        }

        async fn send(&mut self, line: &str) {
            self.stream.write_all(&encode_frame(line.as_bytes())).await.unwrap();
        }

        /// Next message, or `None` on EOF.
        async fn recv(&mut self) -> Option<ServerMessage> {
            let mut buf = [0u8; 4096];
            loop {
                if let Some(payload) = self.decoder.read().unwrap() {
                    return Some(ServerMessage::parse(&payload).unwrap());
                }
                let n = tokio::time::timeout(Duration::from_secs(5), self.stream.read(&mut buf))
                    .await
                    .expect("timed out waiting for server")
                    .unwrap();
                if n == 0 {
                    return None;
                }
                self.decoder.add_chunk(&buf[..n]);
            }
        }
    }

    #[tokio::test]
    async fn test_handshake_and_ping_over_tcp() {
        let server = LockServer::start(test_config()).await.unwrap();
        let mut client = RawClient::connect(server.local_addr()).await;

        client.send("connect s1 1.0").await;
        assert_eq!(
            client.recv().await,
            Some(ServerMessage::Connected { api_version: "1.0".into() })
        );
        client.send("ping p1").await;
        assert_eq!(
            client.recv().await,
            Some(ServerMessage::result("p1", Ok("pong".into())))
        );

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_lock_over_tcp_sends_result_then_locked() {
        let server = LockServer::start(test_config()).await.unwrap();
        let mut client = RawClient::connect(server.local_addr()).await;
        client.send("connect s1 1.0").await;
        client.recv().await;

        client.send("lock r1 goods-1|goods-2 5000").await;
        let Some(ServerMessage::Result { request_id, outcome: Ok(lock_id) }) = client.recv().await
        else {
            panic!("expected lock result");
        };
        assert_eq!(request_id, "r1");
        match client.recv().await {
            Some(ServerMessage::Locked { lock_id: locked, .. }) => assert_eq!(locked.0, lock_id),
            other => panic!("expected locked, got {other:?}"),
        }

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_command_before_connect_closes_connection() {
        let server = LockServer::start(test_config()).await.unwrap();
        let mut client = RawClient::connect(server.local_addr()).await;

        client.send("status s1").await;
        assert_eq!(
            client.recv().await,
            Some(ServerMessage::Error { message: "should connect first!".into() })
        );
        assert_eq!(client.recv().await, None);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_auth_timeout_closes_connection() {
        let config = ServerConfig {
            auth_timeout_ms: 50,
            ..test_config()
        };
        let server = LockServer::start(config).await.unwrap();
        let mut client = RawClient::connect(server.local_addr()).await;

        assert_eq!(
            client.recv().await,
            Some(ServerMessage::Error { message: "auth timeout!".into() })
        );
        assert_eq!(client.recv().await, None);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_unbounded_timeout_does_not_stop_the_server() {
        let server = LockServer::start(test_config()).await.unwrap();
        let mut first = RawClient::connect(server.local_addr()).await;
        first.send("connect sa 1.0").await;
        first.recv().await;

        first.send(&format!("lock r1 x 1000 {}", u64::MAX)).await;
        assert_eq!(
            first.recv().await,
            Some(ServerMessage::result("r1", Err("timeout is too large!".into())))
        );

        let mut second = RawClient::connect(server.local_addr()).await;
        second.send("connect sb 1.0").await;
        assert_eq!(
            second.recv().await,
            Some(ServerMessage::Connected { api_version: "1.0".into() })
        );

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_client_connections() {
        let server = LockServer::start(test_config()).await.unwrap();
        let mut client = RawClient::connect(server.local_addr()).await;
        client.send("connect s1 1.0").await;
        client.recv().await;

        server.shutdown().await;
        assert_eq!(client.recv().await, None);
    }
}
