//! `LockClient`: the user-facing lock handle.

use std::sync::Arc;

use super::multiplexer::{HandleId, Multiplexer};
use super::options::{ClientOptions, LockOptions};
use super::pool;
use crate::error::ClientError;
use crate::protocol::LockId;
use crate::server::ServerStatus;

/// A handle for taking locks on one server.
///
/// Handles targeting the same `host:port` share one [`Multiplexer`] and
/// therefore one TCP connection and one client identity. Dropping the
/// handle detaches it; the shared connection closes shortly after the last
/// handle goes away.
#[derive(Debug)]
pub struct LockClient {
    options: ClientOptions,
    mux: Arc<Multiplexer>,
    handle: HandleId,
}

impl LockClient {
    /// Create a handle from options.
    ///
    /// Does not connect; the first request does.
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        let options = options.resolve()?;
        let mux = pool::acquire(&options.endpoint(), options.socket_id.as_deref());
        Ok(Self::attach(options, mux))
    }

    /// Create a handle from an `mlock://` URI.
    pub fn from_uri(uri: &str) -> Result<Self, ClientError> {
        Self::new(ClientOptions::from_uri(uri))
    }

    /// Create a handle on a specific multiplexer, bypassing the pool.
    pub fn with_multiplexer(
        options: ClientOptions,
        mux: Arc<Multiplexer>,
    ) -> Result<Self, ClientError> {
        Ok(Self::attach(options.resolve()?, mux))
    }

    fn attach(options: ClientOptions, mux: Arc<Multiplexer>) -> Self {
        let handle = mux.attach();
        Self {
            options,
            mux,
            handle,
        }
    }

    /// Identity this handle's connection uses.
    pub fn socket_id(&self) -> &str {
        self.mux.socket_id()
    }

    /// The shared multiplexer.
    pub fn multiplexer(&self) -> &Arc<Multiplexer> {
        &self.mux
    }

    /// Lock one resource, or several separated by `|`, and wait until the
    /// lock is acquired.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidArgument`] if `resource` contains a space or
    ///   no ttl is given here or in the client options.
    /// - [`ClientError::Rejected`] if the server refuses the request (for
    ///   example [`RejectReason::Intolerant`](crate::error::RejectReason)).
    /// - [`ClientError::Timeout`] if the lock was not acquired before its
    ///   timeout.
    /// - [`ClientError::Released`] if it was unlocked through the same
    ///   multiplexer while still queued.
    /// - [`ClientError::ConnectionLost`] or [`ClientError::Connect`] if the
    ///   endpoint was abandoned while the lock was queued.
    pub async fn lock(&self, resource: &str, options: LockOptions) -> Result<LockId, ClientError> {
        if resource.contains(' ') {
            return Err(ClientError::InvalidArgument(
                "resource can not include \" \"".into(),
            ));
        }
        let ttl = options
            .ttl
            .or(self.options.ttl)
            .ok_or_else(|| ClientError::InvalidArgument("ttl is required".into()))?;
        let timeout = options.timeout.or(self.options.timeout).unwrap_or(0);
        let tolerate = options.tolerate.or(self.options.tolerate).unwrap_or(0);

        log::debug!("[Client] lock {} ttl {}", resource, ttl);
        self.mux.connect().await?;
        let resources = self.options.prefixed(resource);
        let (lock_id, wait) = self
            .mux
            .lock(self.handle, &resources, ttl, timeout, tolerate)
            .await?;
        wait.await.unwrap_or(Err(ClientError::ConnectionLost))?;
        Ok(lock_id)
    }

    /// Extend an acquired lock by `ttl` ms (or the client's default ttl).
    ///
    /// Returns the new expiry as epoch milliseconds.
    pub async fn extend(&self, lock_id: &LockId, ttl: Option<u64>) -> Result<u64, ClientError> {
        let ttl = ttl
            .or(self.options.ttl)
            .ok_or_else(|| ClientError::InvalidArgument("ttl is required".into()))?;
        log::debug!("[Client] extend {} ttl {}", lock_id, ttl);
        self.mux.connect().await?;
        self.mux.extend(lock_id, ttl).await
    }

    /// Release a lock, acquired or still queued.
    pub async fn unlock(&self, lock_id: &LockId) -> Result<(), ClientError> {
        log::debug!("[Client] unlock {}", lock_id);
        self.mux.connect().await?;
        self.mux.unlock(lock_id).await
    }

    /// Server status snapshot.
    pub async fn status(&self) -> Result<ServerStatus, ClientError> {
        self.mux.connect().await?;
        self.mux.status().await
    }

    /// Round-trip a ping.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.mux.connect().await?;
        self.mux.ping().await
    }

    /// Detach from the multiplexer. Same as dropping the handle.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for LockClient {
    fn drop(&mut self) {
        self.mux.detach(self.handle);
    }
}
