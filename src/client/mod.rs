//! Lock client.
//!
//! [`LockClient`] handles are cheap; handles for the same `host:port` share
//! one [`Multiplexer`] (one TCP connection, one client identity) through a
//! process-wide pool.

mod handle;
pub mod multiplexer;
mod options;
pub mod pool;

pub use handle::LockClient;
pub use multiplexer::{Endpoint, HandleId, LockWait, Multiplexer, MuxSettings, MuxState};
pub use options::{ClientOptions, LockOptions};
