//! Error types shared by the server and the client.
//!
//! The `Display` text of server-side errors is exactly what travels on the
//! wire (`result <id> failed <text>` or `error <text>`), so clients in other
//! languages see the same messages.

use std::fmt;

/// Per-request failures raised by the lock queue engine.
///
/// Reported as `result <requestId> failed <message>`; never fatal for the
/// connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Bad ttl or a missing/empty field.
    InvalidArgument(&'static str),
    /// A queue already holds more waiters than the caller tolerates.
    Intolerant,
    /// Unknown lock id.
    NotFound,
    /// Extend on a lock that has not been acquired yet.
    NotLocked,
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "{msg}"),
            Self::Intolerant => write!(f, "can not tolerate!"),
            Self::NotFound => write!(f, "lock not exist!"),
            Self::NotLocked => write!(f, "not locked yet!"),
        }
    }
}

impl std::error::Error for LockError {}

/// Connection-fatal errors: the server sends `error <message>` and closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// `connect` on a connection that already has an identity.
    DuplicateConnect,
    /// `connect` without a socket id or api version.
    MissingField(&'static str),
    /// The identity is already bound to another live connection.
    Conflict,
    /// The handshake did not complete within the grace period.
    AuthTimeout,
    /// A command arrived before `connect`.
    NotConnected,
    /// The frame could not be parsed as a command.
    InvalidMessage,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateConnect => write!(f, "duplicate connect!"),
            Self::MissingField(field) => write!(f, "{field} is required!"),
            Self::Conflict => write!(f, "connection conflicted!"),
            Self::AuthTimeout => write!(f, "auth timeout!"),
            Self::NotConnected => write!(f, "should connect first!"),
            Self::InvalidMessage => write!(f, "invalid message!"),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Errors parsing a frame payload into a command or message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Empty payload.
    Empty,
    /// Payload is not valid UTF-8.
    NotUtf8,
    /// First token is not a known command.
    UnknownCommand(String),
    /// A required positional field is absent.
    MissingField {
        /// Command being parsed.
        command: &'static str,
        /// Name of the absent field.
        field: &'static str,
    },
    /// A numeric field failed to parse.
    InvalidNumber {
        /// Name of the field.
        field: &'static str,
        /// Raw text received.
        value: String,
    },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty message"),
            Self::NotUtf8 => write!(f, "message is not valid UTF-8"),
            Self::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            Self::MissingField { command, field } => {
                write!(f, "{command}: missing field {field}")
            }
            Self::InvalidNumber { field, value } => {
                write!(f, "invalid number for {field}: {value}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Classification of a `result ... failed <message>` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Bad ttl or missing field.
    InvalidArgument,
    /// Queue depth exceeded the tolerate threshold.
    Intolerant,
    /// Unknown lock id.
    NotFound,
    /// Extend before acquisition.
    NotLocked,
    /// Any other server message.
    Other,
}

impl RejectReason {
    /// Classify a server failure message.
    pub fn from_message(message: &str) -> Self {
        match message {
            "can not tolerate!" => Self::Intolerant,
            "lock not exist!" => Self::NotFound,
            "not locked yet!" => Self::NotLocked,
            m if m.ends_with("should be integer!")
                || m.ends_with("is required!")
                || m.ends_with("is too large!") =>
            {
                Self::InvalidArgument
            }
            _ => Self::Other,
        }
    }
}

/// Errors surfaced to [`crate::client::LockClient`] callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Caller-side validation failed before anything was sent.
    InvalidArgument(String),
    /// The server answered `result ... failed <message>`.
    Rejected {
        /// Classified reason.
        reason: RejectReason,
        /// Server-supplied text.
        message: String,
    },
    /// The lock never reached the head of its queues before its timeout.
    Timeout,
    /// The lock was unlocked through the same multiplexer before it was
    /// acquired.
    Released,
    /// The transport closed while the request was in flight, or the endpoint
    /// was abandoned.
    ConnectionLost,
    /// The connect cycle failed (transport error after the retry budget, or
    /// a server `error` frame).
    Connect(String),
    /// The server sent something unparseable as a reply.
    Protocol(String),
}

impl ClientError {
    /// Build a [`ClientError::Rejected`] from a server failure message.
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Rejected {
            reason: RejectReason::from_message(&message),
            message,
        }
    }

    /// Reason of a rejection, if this is one.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            Self::Rejected { message, .. } => write!(f, "{message}"),
            Self::Timeout => write!(f, "Lock timeout"),
            Self::Released => write!(f, "Lock released before it was acquired"),
            Self::ConnectionLost => write!(f, "Connection lost"),
            Self::Connect(msg) => write!(f, "Connect failed: {msg}"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}
