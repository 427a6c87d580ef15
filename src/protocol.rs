//! Text command grammar carried inside frames.
//!
//! Every frame payload is one ASCII, space-delimited line:
//!
//! ```text
//! C→S  connect <socketId> <apiVersion>
//! C→S  lock <requestId> <res[|res...]> <ttlMs> [timeoutMs] [tolerate]
//! C→S  extend <requestId> <lockId> <ttlMs>
//! C→S  unlock <requestId> <lockId>
//! C→S  status <requestId>
//! C→S  ping <requestId>
//!
//! S→C  connected <apiVersion>
//! S→C  error <message>
//! S→C  result <requestId> success|failed <payload>
//! S→C  locked <lockId> <expiryEpochMs>
//! S→C  timeout <lockId>
//! S→C  expired <lockId>
//! ```
//!
//! Commands are parsed once into [`ClientCommand`] / [`ServerMessage`];
//! nothing past this module handles raw strings.

use std::fmt;

use crate::error::ProtocolError;

/// Separator between resources in a multi-resource lock request.
pub const RESOURCE_SEPARATOR: char = '|';

/// Identifier of a lock, assigned by the server.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct LockId(pub String);

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LockId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LockId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for LockId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generate a random hex identifier for request and socket ids.
pub fn generate_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Commands sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Handshake. Fields are optional here so the session can report which
    /// one is missing.
    Connect {
        /// Logical client identity, stable across reconnects.
        socket_id: Option<String>,
        /// Client protocol version.
        api_version: Option<String>,
    },
    /// Request a lock on one or more resources.
    Lock {
        /// Correlation id.
        request_id: String,
        /// Resource names in request order.
        resources: Vec<String>,
        /// Lease length in ms. Missing or unparseable text reads as `0`,
        /// which the engine rejects.
        ttl: i64,
        /// Request timeout in ms, `0` for none.
        timeout: u64,
        /// Maximum queue depth to wait behind, `0` for unlimited.
        tolerate: usize,
    },
    /// Extend an acquired lock.
    Extend {
        /// Correlation id.
        request_id: String,
        /// Lock to extend.
        lock_id: LockId,
        /// Milliseconds to add. Missing or unparseable reads as `0`.
        ttl: i64,
    },
    /// Release a lock (pending or acquired).
    Unlock {
        /// Correlation id.
        request_id: String,
        /// Lock to release.
        lock_id: LockId,
    },
    /// Request the server status snapshot.
    Status {
        /// Correlation id.
        request_id: String,
    },
    /// Liveness probe.
    Ping {
        /// Correlation id.
        request_id: String,
    },
}

impl ClientCommand {
    /// Parse a frame payload.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::NotUtf8)?;
        let mut fields = Fields::new(text)?;

        match fields.command.as_str() {
            "connect" => Ok(Self::Connect {
                socket_id: fields.optional().map(str::to_string),
                api_version: fields.optional().map(str::to_string),
            }),
            "lock" => {
                let request_id = fields.required("lock", "requestId")?.to_string();
                let resources = fields
                    .required("lock", "resource")?
                    .split(RESOURCE_SEPARATOR)
                    .map(str::to_string)
                    .collect();
                Ok(Self::Lock {
                    request_id,
                    resources,
                    ttl: fields.optional().and_then(|v| v.parse().ok()).unwrap_or(0),
                    timeout: fields.optional().and_then(|v| v.parse().ok()).unwrap_or(0),
                    tolerate: fields.optional().and_then(|v| v.parse().ok()).unwrap_or(0),
                })
            }
            "extend" => Ok(Self::Extend {
                request_id: fields.required("extend", "requestId")?.to_string(),
                lock_id: fields.required("extend", "lockId")?.into(),
                ttl: fields.optional().and_then(|v| v.parse().ok()).unwrap_or(0),
            }),
            "unlock" => Ok(Self::Unlock {
                request_id: fields.required("unlock", "requestId")?.to_string(),
                lock_id: fields.required("unlock", "lockId")?.into(),
            }),
            "status" => Ok(Self::Status {
                request_id: fields.required("status", "requestId")?.to_string(),
            }),
            "ping" => Ok(Self::Ping {
                request_id: fields.required("ping", "requestId")?.to_string(),
            }),
            _ => Err(ProtocolError::UnknownCommand(fields.command)),
        }
    }

    /// Render as a command line.
    pub fn to_line(&self) -> String {
        match self {
            Self::Connect { socket_id, api_version } => format!(
                "connect {} {}",
                socket_id.as_deref().unwrap_or_default(),
                api_version.as_deref().unwrap_or_default()
            ),
            Self::Lock { request_id, resources, ttl, timeout, tolerate } => format!(
                "lock {request_id} {} {ttl} {timeout} {tolerate}",
                resources.join("|")
            ),
            Self::Extend { request_id, lock_id, ttl } => {
                format!("extend {request_id} {lock_id} {ttl}")
            }
            Self::Unlock { request_id, lock_id } => format!("unlock {request_id} {lock_id}"),
            Self::Status { request_id } => format!("status {request_id}"),
            Self::Ping { request_id } => format!("ping {request_id}"),
        }
    }

    /// Correlation id, for every command except `connect`.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Connect { .. } => None,
            Self::Lock { request_id, .. }
            | Self::Extend { request_id, .. }
            | Self::Unlock { request_id, .. }
            | Self::Status { request_id }
            | Self::Ping { request_id } => Some(request_id),
        }
    }
}

/// Messages sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Handshake accepted.
    Connected {
        /// Server protocol version.
        api_version: String,
    },
    /// Fatal error; the server closes the connection after sending it.
    Error {
        /// Human-readable reason.
        message: String,
    },
    /// Reply to a correlated request.
    Result {
        /// Correlation id of the request.
        request_id: String,
        /// `Ok(payload)` for `success`, `Err(message)` for `failed`.
        outcome: Result<String, String>,
    },
    /// A lock became active.
    Locked {
        /// Lock that was acquired.
        lock_id: LockId,
        /// Expiry deadline, epoch ms.
        expires_at: u64,
    },
    /// A pending lock hit its request timeout.
    Timeout {
        /// Lock that timed out.
        lock_id: LockId,
    },
    /// An active lock's lease lapsed.
    Expired {
        /// Lock that expired.
        lock_id: LockId,
    },
}

impl ServerMessage {
    /// Build a `result` reply.
    pub fn result(request_id: &str, outcome: Result<String, String>) -> Self {
        Self::Result {
            request_id: request_id.to_string(),
            outcome,
        }
    }

    /// Parse a frame payload.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::NotUtf8)?;
        let mut fields = Fields::new(text)?;

        match fields.command.as_str() {
            "connected" => Ok(Self::Connected {
                api_version: fields.rest(),
            }),
            "error" => Ok(Self::Error {
                message: fields.rest(),
            }),
            "result" => {
                let request_id = fields.required("result", "requestId")?.to_string();
                let status = fields.required("result", "status")?;
                let success = status.eq_ignore_ascii_case("success");
                let payload = fields.rest();
                Ok(Self::Result {
                    request_id,
                    outcome: if success { Ok(payload) } else { Err(payload) },
                })
            }
            "locked" => {
                let lock_id = fields.required("locked", "lockId")?.into();
                let raw = fields.required("locked", "expiresAt")?;
                let expires_at = raw.parse().map_err(|_| ProtocolError::InvalidNumber {
                    field: "expiresAt",
                    value: raw.to_string(),
                })?;
                Ok(Self::Locked { lock_id, expires_at })
            }
            "timeout" => Ok(Self::Timeout {
                lock_id: fields.required("timeout", "lockId")?.into(),
            }),
            "expired" => Ok(Self::Expired {
                lock_id: fields.required("expired", "lockId")?.into(),
            }),
            _ => Err(ProtocolError::UnknownCommand(fields.command)),
        }
    }

    /// Render as a command line.
    pub fn to_line(&self) -> String {
        match self {
            Self::Connected { api_version } => format!("connected {api_version}"),
            Self::Error { message } => format!("error {message}"),
            Self::Result { request_id, outcome } => match outcome {
                Ok(payload) => format!("result {request_id} success {payload}"),
                Err(message) => format!("result {request_id} failed {message}"),
            },
            Self::Locked { lock_id, expires_at } => format!("locked {lock_id} {expires_at}"),
            Self::Timeout { lock_id } => format!("timeout {lock_id}"),
            Self::Expired { lock_id } => format!("expired {lock_id}"),
        }
    }
}

/// Positional field cursor over a command line.
struct Fields<'a> {
    command: String,
    rest: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn new(text: &'a str) -> Result<Self, ProtocolError> {
        let text = text.trim_end_matches(['\r', '\n']);
        let mut rest = text.split(' ');
        let command = rest
            .next()
            .filter(|c| !c.is_empty())
            .ok_or(ProtocolError::Empty)?
            .to_ascii_lowercase();
        Ok(Self { command, rest })
    }

    fn optional(&mut self) -> Option<&'a str> {
        self.rest.next().filter(|f| !f.is_empty())
    }

    fn required(
        &mut self,
        command: &'static str,
        field: &'static str,
    ) -> Result<&'a str, ProtocolError> {
        self.optional()
            .ok_or(ProtocolError::MissingField { command, field })
    }

    /// Remaining fields re-joined with spaces (free-text payloads).
    fn rest(&mut self) -> String {
        self.rest.by_ref().collect::<Vec<_>>().join(" ")
    }
}
