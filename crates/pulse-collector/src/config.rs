//! Collector configuration.
//!
//! Loaded from a TOML file at startup; every field has a default so a bare
//! `pulse-collector` runs out of the box. On SIGHUP the file is re-read
//! and the heartbeat key rotated in place.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// UDP bind address for the heartbeat receiver, `host:port`.
    pub bind: String,
    /// Shared secret sealing the heartbeat envelopes. Rotatable at
    /// runtime via config reload.
    pub heartbeat_key: String,
    /// Heartbeats older than this many seconds are distrusted and dropped.
    pub heartbeat_interval_secs: u64,
    /// Concurrent reconciliation workers.
    pub health_workers: usize,
    /// Concurrent statistics workers.
    pub stats_workers: usize,
    /// `SO_RCVBUF` ceiling in bytes; 0 leaves the OS default.
    pub sock_rcvbuf: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5555".to_string(),
            heartbeat_key: "insecure-dev-key".to_string(),
            heartbeat_interval_secs: 10,
            health_workers: 8,
            stats_workers: 4,
            sock_rcvbuf: 0,
        }
    }
}

impl CollectorConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let config = toml::from_str(&raw)
            .with_context(|| format!("parse config file {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: CollectorConfig =
            toml::from_str("bind = \"127.0.0.1:6000\"\nheartbeat_key = \"s3cret\"\n").unwrap();
        assert_eq!(config.bind, "127.0.0.1:6000");
        assert_eq!(config.heartbeat_key, "s3cret");
        assert_eq!(config.heartbeat_interval_secs, 10);
        assert_eq!(config.health_workers, 8);
        assert_eq!(config.sock_rcvbuf, 0);
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: CollectorConfig = toml::from_str("").unwrap();
        assert_eq!(config.bind, "0.0.0.0:5555");
        assert_eq!(config.stats_workers, 4);
    }
}
