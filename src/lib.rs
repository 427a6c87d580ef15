//! mlock - distributed lock coordinator.
//!
//! A TCP server that grants exclusive, time-bounded leases on named
//! resources, plus a client library that multiplexes many lock handles over
//! one connection per server.
//!
//! # Architecture
//!
//! - **Server** - accept loop, per-connection read/write tasks, and a single
//!   coordinator task that owns every lock queue and client identity
//! - **Engine** - per-resource FIFO queues, multi-resource all-or-nothing
//!   acquisition, request timeouts and lease expiry
//! - **Client** - [`LockClient`] handles sharing a pooled [`Multiplexer`]
//!   that reconnects and correlates replies
//!
//! # Modules
//!
//! - [`framing`] - length-prefixed frames
//! - [`protocol`] - text command grammar
//! - [`server`] - [`LockServer`] and its engine/registry
//! - [`client`] - [`LockClient`], options, multiplexer pool
//! - [`config`] - server configuration loading

pub mod client;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod server;

pub use client::{ClientOptions, LockClient, LockOptions, Multiplexer};
pub use config::ServerConfig;
pub use error::{ClientError, HandshakeError, LockError, ProtocolError, RejectReason};
pub use protocol::LockId;
pub use server::{LockServer, ServerStatus};
