//! Protocol-wide constants for mlock.
//!
//! This module centralizes all magic numbers shared by the server and the
//! client so both sides agree on them. Constants are grouped by domain.
//!
//! # Categories
//!
//! - **Protocol**: Wire version and default endpoint
//! - **Server timing**: Handshake grace, sweep fallback, offline retention
//! - **Client timing**: Reconnect policy and detach grace

use std::time::Duration;

// ============================================================================
// Protocol
// ============================================================================

/// Protocol version sent in the `connect` handshake and echoed in `connected`.
pub const API_VERSION: &str = "1.0";

/// Default TCP port for the lock server.
pub const DEFAULT_PORT: u16 = 12340;

/// Default host clients connect to.
pub const DEFAULT_HOST: &str = "localhost";

/// Default address the server binds to.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

// ============================================================================
// Server timing
// ============================================================================

/// Grace period for a new connection to complete the `connect` handshake.
///
/// Connections that stay anonymous longer are closed with `auth timeout!`.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a notification for a disconnected client is kept for replay.
pub const OFFLINE_MESSAGE_RETENTION: Duration = Duration::from_millis(2000);

/// Sweep interval used when no lock has an upcoming deadline.
pub const SWEEP_FALLBACK_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Client timing
// ============================================================================

/// Fixed delay between reconnect attempts (no exponential growth).
pub const RECONNECT_BACKOFF: Duration = Duration::from_millis(1000);

/// Number of reconnect attempts per connect cycle.
pub const RECONNECT_ATTEMPTS: u32 = 10;

/// Delay before an idle multiplexer tears down its transport.
///
/// Canceled if a handle attaches or a lock is pending when it elapses.
pub const DETACH_GRACE: Duration = Duration::from_millis(1000);

/// Read buffer size for socket reads.
pub const READ_BUFFER_SIZE: usize = 16 * 1024;
