//! Connection multiplexer: one TCP transport per endpoint, shared by every
//! [`LockClient`](super::LockClient) that targets it.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──`connected`──► Connected
//!                                 ▲  │                        │
//!                                 │  └─ transport error ──┐   │ transport closed
//!                                 │     (budget left)     │   │ (handles attached,
//!                                 └──── backoff ◄─────────┴───┘  budget left)
//! ```
//!
//! A connect cycle owns a retry budget. When it runs out (or no handle is
//! attached any more) the endpoint is abandoned: connect waiters and pending
//! locks fail, and the next `connect()` starts a fresh cycle.
//!
//! # Correlation
//!
//! Every request carries a fresh request id and parks a oneshot sender in
//! `requests`. The transport task resolves it from the matching `result`
//! frame. For `lock`, the same frame also moves the lock's reply sender into
//! `locks`, keyed by the new lock id, before the next frame is read, so a
//! `locked` that arrives right behind its `result` is never missed.
//!
//! All bookkeeping lives behind one `std::sync::Mutex` that is never held
//! across an await.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::constants::{
    API_VERSION, DETACH_GRACE, READ_BUFFER_SIZE, RECONNECT_ATTEMPTS, RECONNECT_BACKOFF,
};
use crate::error::ClientError;
use crate::framing::{encode_frame, FrameDecoder};
use crate::protocol::{generate_id, ClientCommand, LockId, ServerMessage, RESOURCE_SEPARATOR};
use crate::server::ServerStatus;

/// A lock server address. One multiplexer exists per endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IP.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Build an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Connection state of a multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxState {
    /// No transport and no retry scheduled.
    Disconnected,
    /// Opening a transport, waiting for `connected`, or backing off.
    Connecting,
    /// Handshake acknowledged.
    Connected,
}

/// Timing knobs for reconnects and idle teardown.
#[derive(Debug, Clone)]
pub struct MuxSettings {
    /// Retries per connect cycle.
    pub reconnect_attempts: u32,
    /// Fixed delay between retries.
    pub reconnect_backoff: Duration,
    /// Idle time before the transport is closed after the last detach.
    pub detach_grace: Duration,
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            reconnect_attempts: RECONNECT_ATTEMPTS,
            reconnect_backoff: RECONNECT_BACKOFF,
            detach_grace: DETACH_GRACE,
        }
    }
}

/// Identifies a [`LockClient`](super::LockClient) attached to a multiplexer.
pub type HandleId = u64;

/// Resolves with the expiry once a queued lock becomes active.
pub type LockWait = oneshot::Receiver<Result<u64, ClientError>>;

type ConnectOutcome = Option<Result<(), ClientError>>;

struct PendingLock {
    handle: HandleId,
    reply: oneshot::Sender<Result<u64, ClientError>>,
}

struct PendingRequest {
    reply: oneshot::Sender<Result<String, ClientError>>,
    lock: Option<PendingLock>,
}

struct Transport {
    writer: mpsc::UnboundedSender<Vec<u8>>,
    cancel: CancellationToken,
}

struct Shared {
    state: MuxState,
    /// Outcome of the current connect cycle; `None` when no cycle runs.
    outcome: Option<watch::Sender<ConnectOutcome>>,
    retries_left: u32,
    /// Bumped for every new cycle and every teardown so stale transport
    /// tasks can tell they were superseded.
    generation: u64,
    last_error: Option<ClientError>,
    transport: Option<Transport>,
    requests: HashMap<String, PendingRequest>,
    locks: HashMap<LockId, PendingLock>,
    handles: HashSet<HandleId>,
    next_handle: HandleId,
}

impl Shared {
    fn fail_requests(&mut self) {
        for (_, request) in self.requests.drain() {
            let _ = request.reply.send(Err(ClientError::ConnectionLost));
        }
    }
}

/// Shared transport to one lock server.
pub struct Multiplexer {
    endpoint: Endpoint,
    socket_id: String,
    settings: MuxSettings,
    shared: Mutex<Shared>,
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("endpoint", &self.endpoint)
            .field("socket_id", &self.socket_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Multiplexer {
    /// Create a multiplexer with default timings. Nothing connects until
    /// [`Multiplexer::connect`] is called.
    pub fn new(endpoint: Endpoint, socket_id: String) -> Arc<Self> {
        Self::with_settings(endpoint, socket_id, MuxSettings::default())
    }

    /// Create a multiplexer with custom timings.
    pub fn with_settings(endpoint: Endpoint, socket_id: String, settings: MuxSettings) -> Arc<Self> {
        Arc::new(Self {
            endpoint,
            socket_id,
            settings,
            shared: Mutex::new(Shared {
                state: MuxState::Disconnected,
                outcome: None,
                retries_left: 0,
                generation: 0,
                last_error: None,
                transport: None,
                requests: HashMap::new(),
                locks: HashMap::new(),
                handles: HashSet::new(),
                next_handle: 0,
            }),
        })
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Server endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Identity sent in the handshake.
    pub fn socket_id(&self) -> &str {
        &self.socket_id
    }

    /// Current connection state.
    pub fn state(&self) -> MuxState {
        self.shared().state
    }

    /// Number of attached handles.
    pub fn handle_count(&self) -> usize {
        self.shared().handles.len()
    }

    /// Locks waiting for `locked` or `timeout`.
    pub fn pending_lock_count(&self) -> usize {
        self.shared().locks.len()
    }

    /// Register a new handle.
    pub fn attach(&self) -> HandleId {
        let mut shared = self.shared();
        shared.next_handle += 1;
        let handle = shared.next_handle;
        shared.handles.insert(handle);
        handle
    }

    /// Remove a handle and the locks it is waiting for.
    ///
    /// When nothing is left attached or pending, the transport is closed
    /// after the detach grace period unless something attaches meanwhile.
    pub fn detach(self: &Arc<Self>, handle: HandleId) {
        let idle = {
            let mut shared = self.shared();
            shared.handles.remove(&handle);
            shared.locks.retain(|_, lock| lock.handle != handle);
            shared.handles.is_empty() && shared.locks.is_empty()
        };
        if !idle {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let mux = Arc::clone(self);
                runtime.spawn(async move {
                    tokio::time::sleep(mux.settings.detach_grace).await;
                    mux.teardown_if_idle();
                });
            }
            Err(_) => self.teardown_if_idle(),
        }
    }

    fn teardown_if_idle(&self) {
        let mut shared = self.shared();
        if !shared.handles.is_empty() || !shared.locks.is_empty() {
            return;
        }
        if shared.transport.is_none() && shared.outcome.is_none() {
            return;
        }

        log::debug!("[Mux] {} idle, closing transport", self.endpoint);
        shared.generation += 1;
        shared.state = MuxState::Disconnected;
        shared.outcome = None;
        shared.last_error = None;
        if let Some(transport) = shared.transport.take() {
            transport.cancel.cancel();
        }
        shared.fail_requests();
    }

    /// Wait until the endpoint is connected.
    ///
    /// Joins the running connect cycle if there is one (or returns at once if
    /// it already succeeded); otherwise starts a new cycle.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        let mut outcome = {
            let mut shared = self.shared();
            if let Some(outcome) = &shared.outcome {
                outcome.subscribe()
            } else {
                let (tx, rx) = watch::channel(None);
                shared.outcome = Some(tx);
                shared.generation += 1;
                shared.retries_left = self.settings.reconnect_attempts;
                shared.last_error = None;
                shared.state = MuxState::Connecting;
                tokio::spawn(Arc::clone(self).run_connection_loop(shared.generation));
                rx
            }
        };

        let result = match outcome.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone().unwrap_or(Err(ClientError::ConnectionLost)),
            Err(_) => Err(ClientError::ConnectionLost),
        };
        result
    }

    /// Connect-and-retry loop of one cycle.
    async fn run_connection_loop(self: Arc<Self>, generation: u64) {
        loop {
            log::debug!("[Mux] Connecting to {}", self.endpoint);
            let address = (self.endpoint.host.as_str(), self.endpoint.port);
            let failure = match TcpStream::connect(address).await {
                Ok(stream) => {
                    let Some((writer_rx, cancel)) = self.install_transport(generation) else {
                        return;
                    };
                    self.run_transport(generation, stream, writer_rx, cancel).await;
                    None
                }
                Err(e) => {
                    log::debug!("[Mux] Connect to {} failed: {e}", self.endpoint);
                    Some(ClientError::Connect(e.to_string()))
                }
            };

            if !self.on_transport_closed(generation, failure) {
                return;
            }
            tokio::time::sleep(self.settings.reconnect_backoff).await;
            if self.shared().generation != generation {
                return;
            }
        }
    }

    /// Publish the writer for a fresh transport and queue the handshake.
    fn install_transport(
        &self,
        generation: u64,
    ) -> Option<(mpsc::UnboundedReceiver<Vec<u8>>, CancellationToken)> {
        let mut shared = self.shared();
        if shared.generation != generation {
            return None;
        }

        let (writer, writer_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let hello = ClientCommand::Connect {
            socket_id: Some(self.socket_id.clone()),
            api_version: Some(API_VERSION.to_string()),
        };
        let _ = writer.send(encode_frame(hello.to_line().as_bytes()));
        shared.transport = Some(Transport {
            writer,
            cancel: cancel.clone(),
        });
        Some((writer_rx, cancel))
    }

    /// Decide what happens after a transport closed or failed to open.
    ///
    /// Returns `true` if another attempt should follow the backoff.
    fn on_transport_closed(&self, generation: u64, failure: Option<ClientError>) -> bool {
        let mut guard = self.shared();
        if guard.generation != generation {
            return false;
        }
        let shared = &mut *guard;

        if let Some(error) = failure {
            shared.last_error = Some(error);
        }

        let was_connected = shared.state == MuxState::Connected;
        shared.state = MuxState::Disconnected;
        shared.transport = None;
        shared.fail_requests();

        if shared.retries_left == 0 || shared.handles.is_empty() {
            let error = shared.last_error.take().unwrap_or(ClientError::ConnectionLost);
            log::warn!("[Mux] Giving up on {}: {error}", self.endpoint);
            if let Some(outcome) = shared.outcome.take() {
                outcome.send_replace(Some(Err(error.clone())));
            }
            for (_, lock) in shared.locks.drain() {
                let _ = lock.reply.send(Err(error.clone()));
            }
            return false;
        }

        shared.retries_left -= 1;
        if was_connected {
            let (outcome, _) = watch::channel(None);
            shared.outcome = Some(outcome);
        }
        shared.state = MuxState::Connecting;
        log::info!(
            "[Mux] Lost {}, retrying in {}ms ({} attempts left)",
            self.endpoint,
            self.settings.reconnect_backoff.as_millis(),
            shared.retries_left
        );
        true
    }

    /// Pump one transport until it closes or is canceled.
    async fn run_transport(
        &self,
        generation: u64,
        stream: TcpStream,
        mut writer_rx: mpsc::UnboundedReceiver<Vec<u8>>,
        cancel: CancellationToken,
    ) {
        let (mut reader, mut writer) = stream.into_split();
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = writer.shutdown().await;
                    return;
                }
                Some(frame) = writer_rx.recv() => {
                    if let Err(e) = writer.write_all(&frame).await {
                        log::debug!("[Mux] Write to {} failed: {e}", self.endpoint);
                        return;
                    }
                }
                read = reader.read(&mut buf) => {
                    let n = match read {
                        Ok(0) => {
                            log::debug!("[Mux] {} closed the connection", self.endpoint);
                            return;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            log::debug!("[Mux] Read from {} failed: {e}", self.endpoint);
                            return;
                        }
                    };
                    let frames = match decoder.feed(&buf[..n]) {
                        Ok(frames) => frames,
                        Err(e) => {
                            log::warn!("[Mux] Bad frame from {}: {e}", self.endpoint);
                            return;
                        }
                    };
                    for payload in frames {
                        self.handle_frame(generation, &payload);
                    }
                }
            }
        }
    }

    fn handle_frame(&self, generation: u64, payload: &[u8]) {
        let message = match ServerMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("[Mux] Ignoring frame from {}: {e}", self.endpoint);
                return;
            }
        };
        log::trace!("[Mux] received: {}", message.to_line());

        let mut guard = self.shared();
        if guard.generation != generation {
            return;
        }
        let shared = &mut *guard;

        match message {
            ServerMessage::Connected { api_version } => {
                log::info!(
                    "[Mux] Connected to {} as {} (api {})",
                    self.endpoint,
                    self.socket_id,
                    api_version
                );
                shared.state = MuxState::Connected;
                shared.retries_left = self.settings.reconnect_attempts;
                shared.last_error = None;
                if let Some(outcome) = &shared.outcome {
                    outcome.send_replace(Some(Ok(())));
                }
            }
            ServerMessage::Error { message } => {
                log::warn!("[Mux] {} refused the connection: {message}", self.endpoint);
                shared.retries_left = 0;
                let error = ClientError::Connect(message);
                if let Some(outcome) = shared.outcome.take() {
                    outcome.send_replace(Some(Err(error.clone())));
                }
                shared.last_error = Some(error);
            }
            ServerMessage::Result { request_id, outcome } => {
                let Some(request) = shared.requests.remove(&request_id) else {
                    log::debug!("[Mux] No request waiting for result {}", request_id);
                    return;
                };
                if let (Ok(lock_id), Some(lock)) = (&outcome, request.lock) {
                    if shared.handles.contains(&lock.handle) {
                        shared.locks.insert(LockId::from(lock_id.as_str()), lock);
                    }
                }
                let _ = request.reply.send(outcome.map_err(ClientError::rejected));
            }
            ServerMessage::Locked { lock_id, expires_at } => {
                if let Some(lock) = shared.locks.remove(&lock_id) {
                    let _ = lock.reply.send(Ok(expires_at));
                }
            }
            ServerMessage::Timeout { lock_id } => {
                if let Some(lock) = shared.locks.remove(&lock_id) {
                    let _ = lock.reply.send(Err(ClientError::Timeout));
                }
            }
            ServerMessage::Expired { lock_id } => {
                log::debug!("[Mux] Lock {} expired on {}", lock_id, self.endpoint);
            }
        }
    }

    /// Send a correlated request and wait for its `result`.
    async fn request(
        &self,
        build: impl FnOnce(String) -> ClientCommand,
        lock: Option<PendingLock>,
    ) -> Result<String, ClientError> {
        let request_id = generate_id();
        let line = build(request_id.clone()).to_line();
        let (reply, reply_rx) = oneshot::channel();

        {
            let mut guard = self.shared();
            let shared = &mut *guard;
            let Some(transport) = &shared.transport else {
                return Err(ClientError::ConnectionLost);
            };
            log::debug!("[Mux] send: {}", line);
            if transport.writer.send(encode_frame(line.as_bytes())).is_err() {
                return Err(ClientError::ConnectionLost);
            }
            shared.requests.insert(request_id, PendingRequest { reply, lock });
        }

        reply_rx.await.unwrap_or(Err(ClientError::ConnectionLost))
    }

    /// Queue a lock for `handle` on pipe-separated `resources`.
    ///
    /// Returns the server-assigned id and a receiver that resolves with the
    /// expiry once the lock is acquired (or with [`ClientError::Timeout`]).
    pub async fn lock(
        &self,
        handle: HandleId,
        resources: &str,
        ttl: u64,
        timeout: u64,
        tolerate: usize,
    ) -> Result<(LockId, LockWait), ClientError> {
        let (reply, wait) = oneshot::channel();
        let resources = resources
            .split(RESOURCE_SEPARATOR)
            .map(str::to_string)
            .collect();
        let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);

        let lock_id = self
            .request(
                |request_id| ClientCommand::Lock {
                    request_id,
                    resources,
                    ttl,
                    timeout,
                    tolerate,
                },
                Some(PendingLock { handle, reply }),
            )
            .await?;
        Ok((LockId::from(lock_id), wait))
    }

    /// Extend an active lock by `ttl` ms; returns the new expiry.
    pub async fn extend(&self, lock_id: &LockId, ttl: u64) -> Result<u64, ClientError> {
        let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
        let expiry = self
            .request(
                |request_id| ClientCommand::Extend {
                    request_id,
                    lock_id: lock_id.clone(),
                    ttl,
                },
                None,
            )
            .await?;
        expiry
            .parse()
            .map_err(|e| ClientError::Protocol(format!("invalid expiry '{expiry}': {e}")))
    }

    /// Release a lock. A caller still waiting for it to activate sees
    /// [`ClientError::Released`].
    pub async fn unlock(&self, lock_id: &LockId) -> Result<(), ClientError> {
        self.request(
            |request_id| ClientCommand::Unlock {
                request_id,
                lock_id: lock_id.clone(),
            },
            None,
        )
        .await?;
        let released = self.shared().locks.remove(lock_id);
        if let Some(lock) = released {
            let _ = lock.reply.send(Err(ClientError::Released));
        }
        Ok(())
    }

    /// Fetch the server status snapshot.
    pub async fn status(&self) -> Result<ServerStatus, ClientError> {
        let json = self
            .request(|request_id| ClientCommand::Status { request_id }, None)
            .await?;
        serde_json::from_str(&json)
            .map_err(|e| ClientError::Protocol(format!("invalid status payload: {e}")))
    }

    /// Round-trip a `ping`.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.request(|request_id| ClientCommand::Ping { request_id }, None)
            .await
            .map(|_| ())
    }
}
