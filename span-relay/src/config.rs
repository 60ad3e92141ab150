//! Configuration for the relay server.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use span_core::RelayConfig as StoreConfig;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub sessions: SessionsConfig,
    pub commands: CommandsConfig,
    pub frames: FramesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. `0.0.0.0:8080`.
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Seconds without a drain or publish before a session is reaped.
    pub ttl_secs: u64,
    /// Characters in an issued session id.
    pub id_length: usize,
    pub max_sessions: usize,
    /// Minimum spacing between expiry sweeps, in milliseconds.
    pub reap_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Pending commands kept per session; the oldest is dropped beyond this.
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesConfig {
    /// Largest accepted request body, base64 overhead included.
    pub max_frame_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            id_length: 6,
            max_sessions: 1024,
            reap_interval_ms: 1_000,
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 8 * 1024 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl RelayConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Store tunables for [`span_core::RelayService`].
    pub fn to_store_config(&self) -> StoreConfig {
        StoreConfig {
            session_ttl: Duration::from_secs(self.sessions.ttl_secs.max(1)),
            id_length: self.sessions.id_length.clamp(4, 32),
            max_sessions: self.sessions.max_sessions.max(1),
            queue_capacity: self.commands.queue_capacity.max(1),
            reap_interval: Duration::from_millis(self.sessions.reap_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&RelayConfig::default()).unwrap();
        assert!(text.contains("ttl_secs = 1800"));
        assert!(text.contains("queue_capacity = 256"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: RelayConfig = toml::from_str("[sessions]\nttl_secs = 60\n").unwrap();
        assert_eq!(cfg.sessions.ttl_secs, 60);
        assert_eq!(cfg.sessions.id_length, 6);
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn store_config_clamps() {
        let mut cfg = RelayConfig::default();
        cfg.sessions.id_length = 1;
        cfg.commands.queue_capacity = 0;
        let store = cfg.to_store_config();
        assert_eq!(store.id_length, 4);
        assert_eq!(store.queue_capacity, 1);
        assert_eq!(store.session_ttl, Duration::from_secs(1800));
        assert_eq!(store.reap_interval, Duration::from_secs(1));
    }

    #[test]
    fn reap_interval_is_configurable() {
        let cfg: RelayConfig = toml::from_str("[sessions]\nreap_interval_ms = 0\n").unwrap();
        assert_eq!(cfg.to_store_config().reap_interval, Duration::ZERO);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = RelayConfig::load(Path::new("/nonexistent/span-relay.toml"));
        assert_eq!(cfg.frames.max_frame_bytes, 8 * 1024 * 1024);
    }
}
