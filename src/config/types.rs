//! Core configuration types and loading.

use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::{
    default_exporter_bind, default_exporter_path, default_exporter_port,
    default_max_payload_bytes, default_poll_interval_ms, default_true,
};
use crate::error::MetricsError;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Instrumentation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Namespace discovery and traffic measurement.
    #[serde(default)]
    pub instrumentation: InstrumentationConfig,
    /// Optional pull endpoint for the metrics registry.
    #[serde(default)]
    pub exporter: ExporterConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// Namespace discovery and payload measurement.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentationConfig {
    /// Rescan for namespaces created after startup (default: true).
    #[serde(default = "default_true")]
    pub check_for_new_namespaces: bool,

    /// Milliseconds between rescans (default: 2000). 0 disables rescanning,
    /// leaving only the scan at startup.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Also register process metrics (CPU, memory, file descriptors).
    #[serde(default)]
    pub collect_default_metrics: bool,

    /// Payloads whose serialized form exceeds this many bytes are counted
    /// as events but contribute 0 bytes (default: 1 MiB).
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            check_for_new_namespaces: default_true(),
            poll_interval_ms: default_poll_interval_ms(),
            collect_default_metrics: false,
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl InstrumentationConfig {
    /// Effective rescan period, or `None` when rescanning is disabled.
    pub fn poll_interval(&self) -> Option<Duration> {
        if !self.check_for_new_namespaces || self.poll_interval_ms == 0 {
            return None;
        }
        Some(Duration::from_millis(self.poll_interval_ms))
    }
}

/// Metrics pull endpoint.
///
/// When disabled, the host application serves the registry itself.
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Start the endpoint automatically (default: false).
    #[serde(default)]
    pub enabled: bool,

    /// Listen address (default: "0.0.0.0").
    #[serde(default = "default_exporter_bind")]
    pub bind: String,

    /// Listen port (default: 9090).
    #[serde(default = "default_exporter_port")]
    pub port: u16,

    /// HTTP path serving the metrics (default: "/metrics").
    #[serde(default = "default_exporter_path")]
    pub path: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_exporter_bind(),
            port: default_exporter_port(),
            path: default_exporter_path(),
        }
    }
}

impl ExporterConfig {
    /// Resolve `bind` and `port` into a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, MetricsError> {
        let ip: IpAddr = self
            .bind
            .parse()
            .map_err(|source| MetricsError::InvalidAddress {
                addr: self.bind.clone(),
                source,
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
