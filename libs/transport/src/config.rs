//! Transport configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for hosts and client links.
///
/// Deserializable so services can load it from their config files; every
/// field falls back to the protocol's long-standing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Service port for general traffic.
    pub port: u16,
    /// Interval between client keep-alives.
    pub heartbeat_ms: u64,
    /// Pause before a client reconnection attempt.
    pub retry_ms: u64,
    /// Per-frame byte ceiling enforced by the stream reader.
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 4242,
            heartbeat_ms: 5_000,
            retry_ms: 3_000,
            max_frame_bytes: codec::DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl TransportConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.port, 4242);
        assert_eq!(cfg.heartbeat(), Duration::from_secs(5));
        assert_eq!(cfg.retry(), Duration::from_secs(3));
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let cfg: TransportConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.heartbeat_ms, 5_000);
    }
}
