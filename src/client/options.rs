//! Client configuration.
//!
//! ```ignore
//! let options = ClientOptions::new()
//!     .host("locks.internal")
//!     .prefix("orders:")
//!     .ttl(5000);
//! let client = LockClient::new(options)?;
//!
//! // or from a URI
//! let client = LockClient::from_uri("mlock://locks.internal:12340?timeout=3000&prefix=orders:")?;
//! ```

use url::Url;

use super::multiplexer::Endpoint;
use crate::constants::{DEFAULT_HOST, DEFAULT_PORT};
use crate::error::ClientError;
use crate::protocol::RESOURCE_SEPARATOR;

/// Options for a [`LockClient`](super::LockClient).
///
/// Everything is optional. Values from `uri` win over `host`, `port`,
/// `timeout`, `tolerate` and `prefix` set directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// `mlock://host:port?timeout=..&tolerate=..&prefix=..`
    pub uri: Option<String>,
    /// Server host, default `localhost`.
    pub host: Option<String>,
    /// Server port, default 12340.
    pub port: Option<u16>,
    /// Prepended to every resource name.
    pub prefix: Option<String>,
    /// Default lease length (ms) for `lock` and `extend`.
    pub ttl: Option<u64>,
    /// Default request timeout (ms) for `lock`.
    pub timeout: Option<u64>,
    /// Default tolerate threshold for `lock`.
    pub tolerate: Option<usize>,
    /// Identity used in the handshake; random if unset.
    pub socket_id: Option<String>,
}

impl ClientOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options carrying only a URI.
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self::new().uri(uri)
    }

    /// Set the URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the resource prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the default ttl (ms).
    pub fn ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the default lock timeout (ms).
    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the default tolerate threshold.
    pub fn tolerate(mut self, tolerate: usize) -> Self {
        self.tolerate = Some(tolerate);
        self
    }

    /// Set the handshake identity.
    pub fn socket_id(mut self, socket_id: impl Into<String>) -> Self {
        self.socket_id = Some(socket_id.into());
        self
    }

    /// Fold the URI into the explicit fields and validate the result.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidArgument`] for an unparseable URI or a prefix
    /// containing `|` or a space.
    pub fn resolve(mut self) -> Result<Self, ClientError> {
        if let Some(uri) = self.uri.clone() {
            self.apply_uri(&uri)?;
        }
        if let Some(prefix) = &self.prefix {
            if prefix.contains(RESOURCE_SEPARATOR) || prefix.contains(' ') {
                return Err(ClientError::InvalidArgument(
                    "prefix can not include \"|\" or \" \"".into(),
                ));
            }
        }
        Ok(self)
    }

    fn apply_uri(&mut self, uri: &str) -> Result<(), ClientError> {
        let url = Url::parse(uri)
            .map_err(|e| ClientError::InvalidArgument(format!("invalid uri '{uri}': {e}")))?;

        if let Some(host) = url.host_str().filter(|h| !h.is_empty()) {
            self.host = Some(host.to_string());
        }
        self.port = Some(url.port().unwrap_or(DEFAULT_PORT));

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "timeout" => {
                    if let Some(timeout) = value.parse::<u64>().ok().filter(|t| *t > 0) {
                        self.timeout = Some(timeout);
                    }
                }
                "tolerate" => {
                    if let Some(tolerate) = value.parse::<usize>().ok().filter(|t| *t > 0) {
                        self.tolerate = Some(tolerate);
                    }
                }
                "prefix" if !value.is_empty() => self.prefix = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(())
    }

    /// Server endpoint with defaults applied.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(
            self.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
            self.port.unwrap_or(DEFAULT_PORT),
        )
    }

    /// Apply the prefix to every resource of a pipe-separated list.
    pub fn prefixed(&self, resource: &str) -> String {
        match &self.prefix {
            Some(prefix) => resource
                .split(RESOURCE_SEPARATOR)
                .map(|r| format!("{prefix}{r}"))
                .collect::<Vec<_>>()
                .join("|"),
            None => resource.to_string(),
        }
    }
}

/// Per-call overrides for [`LockClient::lock`](super::LockClient::lock).
///
/// Unset fields fall back to the client's [`ClientOptions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockOptions {
    /// Lease length in ms.
    pub ttl: Option<u64>,
    /// Request timeout in ms, `0` for none.
    pub timeout: Option<u64>,
    /// Maximum queue depth to wait behind, `0` for unlimited.
    pub tolerate: Option<usize>,
}

impl LockOptions {
    /// Options with a lease length.
    pub fn ttl(ttl: u64) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the tolerate threshold.
    pub fn with_tolerate(mut self, tolerate: usize) -> Self {
        self.tolerate = Some(tolerate);
        self
    }
}
