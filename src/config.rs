//! Server configuration loading.
//!
//! Defaults come from [`crate::constants`]. A JSON file (`mlock serve
//! --config <path>`) may override any field, and `MLOCK_BIND` / `MLOCK_PORT`
//! override the listen address last.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    AUTH_TIMEOUT, DEFAULT_BIND_HOST, DEFAULT_PORT, OFFLINE_MESSAGE_RETENTION,
    SWEEP_FALLBACK_INTERVAL,
};

/// Configuration for the lock server.
///
/// Durations are stored as milliseconds so the JSON file stays readable.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address to bind the TCP listener to.
    pub host: String,
    /// TCP port. `0` asks the OS for an ephemeral port.
    pub port: u16,
    /// Handshake grace period in milliseconds.
    pub auth_timeout_ms: u64,
    /// Offline message retention in milliseconds.
    pub offline_retention_ms: u64,
    /// Sweep fallback interval in milliseconds.
    pub sweep_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            auth_timeout_ms: AUTH_TIMEOUT.as_millis() as u64,
            offline_retention_ms: OFFLINE_MESSAGE_RETENTION.as_millis() as u64,
            sweep_interval_ms: SWEEP_FALLBACK_INTERVAL.as_millis() as u64,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from an optional JSON file, then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MLOCK_BIND") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("MLOCK_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(e) => log::warn!("Ignoring invalid MLOCK_PORT '{}': {}", port, e),
            }
        }
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Handshake grace period.
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    /// Offline message retention window.
    pub fn offline_retention(&self) -> Duration {
        Duration::from_millis(self.offline_retention_ms)
    }

    /// Sweep fallback interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
