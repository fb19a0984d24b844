//! Configuration loading and validation for the sentinel process.
//!
//! This is the thin, out-of-core layer described in `spec.md` §6: the core state
//! machines consume a [`Configuration`] but never load or validate one themselves.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Hysteresis threshold count for one polarity (failure or recover).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub count: u32,
}

/// Probing parameters shared by the health monitor and the sync manager's
/// single-peer monitor of the remote sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Probe / gossip period, in seconds.
    pub interval: u64,
    /// Per-request timeout, in seconds.
    pub timeout: u64,
    pub failure: ThresholdConfig,
    pub recover: ThresholdConfig,
    /// Path appended to `http://{peer_addr}` to request health.
    pub url: String,
    /// When true, a non-2xx HTTP status is itself a failure. When false, only
    /// transport errors and body/decode failures count as failures (kept for
    /// parity with the original source's looser default; `spec.md` §6 assumes
    /// the stricter `true` behavior and that is this crate's default).
    #[serde(default = "default_check_code")]
    pub check_code: bool,
}

fn default_check_code() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: 2,
            timeout: 3,
            failure: ThresholdConfig { count: 3 },
            recover: ThresholdConfig { count: 2 },
            url: "/health".to_string(),
            check_code: true,
        }
    }
}

/// Full process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// The two-sentinel cluster, including this node's own address.
    pub cluster: Vec<String>,

    pub ip: String,
    pub port: u16,
    pub proxy_port: u16,

    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub monitor: SyncConfig,

    /// Endpoint control addresses.
    pub backends: Vec<String>,
    pub backend_proxied_port: u16,

    pub to_master: String,
    pub to_slave: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Configuration {
    /// Load and parse a TOML configuration file. Does not validate — call
    /// [`Configuration::validate`] afterward.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let cfg: Configuration = toml::from_str(&text)?;
        Ok(cfg)
    }

    /// Validate required fields. Mirrors the original source's `Validate`:
    /// exactly two sentinels, non-empty backends, non-zero port, non-empty IP.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ip.is_empty() {
            return Err(ConfigError::Validation("invalid ip address".into()));
        }
        if self.cluster.len() != 2 {
            return Err(ConfigError::Validation(
                "invalid cluster, only two sentinels are supported".into(),
            ));
        }
        if self.backends.is_empty() {
            return Err(ConfigError::Validation("invalid backends".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation("invalid listening port".into()));
        }
        Ok(())
    }

    /// This sentinel's own control address, as it would appear in `cluster`.
    pub fn self_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// The peer sentinel's control address: the one `cluster` entry that
    /// isn't this node.
    pub fn peer_addr(&self) -> Option<&str> {
        let self_addr = self.self_addr();
        self.cluster
            .iter()
            .find(|p| p.as_str() != self_addr && p.as_str() != self.ip.as_str())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Configuration {
        Configuration {
            log_level: "info".into(),
            cluster: vec!["10.0.0.1:9000".into(), "10.0.0.2:9000".into()],
            ip: "10.0.0.1".into(),
            port: 9000,
            proxy_port: 9001,
            sync: SyncConfig::default(),
            monitor: SyncConfig::default(),
            backends: vec!["10.0.0.10:8000".into()],
            backend_proxied_port: 8080,
            to_master: "/to_master".into(),
            to_slave: "/to_slave".into(),
        }
    }

    #[test]
    fn validates_a_well_formed_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_wrong_cluster_size() {
        let mut cfg = base_config();
        cfg.cluster.push("10.0.0.3:9000".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_backends() {
        let mut cfg = base_config();
        cfg.backends.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_port() {
        let mut cfg = base_config();
        cfg.port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn peer_addr_is_the_other_cluster_member() {
        let cfg = base_config();
        assert_eq!(cfg.peer_addr(), Some("10.0.0.2:9000"));
    }

    #[test]
    fn default_sync_config_matches_original_defaults() {
        let s = SyncConfig::default();
        assert_eq!(s.interval, 2);
        assert_eq!(s.timeout, 3);
        assert_eq!(s.failure.count, 3);
        assert_eq!(s.recover.count, 2);
        assert_eq!(s.url, "/health");
    }
}
