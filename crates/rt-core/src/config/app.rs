//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::TransportConfig;

/// Top-level configuration file (`config.toml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Queued input/resize commands per session before writes are refused
    pub input_buffer: usize,

    /// Location of the host book; defaults to `hosts.toml` next to this file
    pub hosts_file: Option<PathBuf>,

    /// Transport timeouts and keep-alive policy
    pub transport: TransportConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_buffer: 256,
            hosts_file: None,
            transport: TransportConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolved host book path
    pub fn hosts_path(&self) -> PathBuf {
        self.hosts_file
            .clone()
            .unwrap_or_else(super::default_hosts_path)
    }
}
