//! Wall-clock helpers.
//!
//! Deadlines travel on the wire as epoch milliseconds, so both sides use the
//! same clock source.

/// Current time as epoch milliseconds.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
