//! Transport configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Connection policy owned by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Upper bound for reaching the server and authenticating
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Interval between keep-alive probes
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,

    /// Unanswered keep-alives before the connection is dropped
    pub keepalive_max: usize,

    /// Terminal type requested for the pseudo-terminal
    pub term: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(10),
            keepalive_max: 3,
            term: "xterm-256color".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.keepalive_interval, Duration::from_secs(10));
        assert_eq!(config.keepalive_max, 3);
        assert_eq!(config.term, "xterm-256color");
    }

    #[test]
    fn test_partial_table_keeps_defaults() {
        let config: TransportConfig = toml::from_str("connect_timeout = 5").unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.keepalive_max, 3);
    }
}
