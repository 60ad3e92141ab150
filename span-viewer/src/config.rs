//! Viewer configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use span_core::ControllerConfig;

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub relay: RelayConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL of the relay.
    pub url: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// How often to ask the relay for a new frame.
    pub poll_interval_ms: u64,
    /// Each new frame overwrites this file.
    pub output: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".into(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            output: PathBuf::from("span-frame.jpg"),
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

impl ViewerConfig {
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

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.relay.connect_timeout_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.relay.request_timeout_ms.max(1))
    }

    pub fn to_controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            poll_interval: Duration::from_millis(self.display.poll_interval_ms.max(10)),
            ..ControllerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ViewerConfig::default()).unwrap();
        assert!(text.contains("poll_interval_ms = 500"));
        assert!(text.contains("output = \"span-frame.jpg\""));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: ViewerConfig = toml::from_str("[display]\noutput = \"/tmp/x.jpg\"\n").unwrap();
        assert_eq!(cfg.display.output, PathBuf::from("/tmp/x.jpg"));
        assert_eq!(cfg.display.poll_interval_ms, 500);
        assert_eq!(cfg.relay.url, "http://localhost:8080");
    }

    #[test]
    fn controller_config_uses_poll_interval() {
        let mut cfg = ViewerConfig::default();
        cfg.display.poll_interval_ms = 250;
        assert_eq!(cfg.to_controller_config().poll_interval, Duration::from_millis(250));
    }
}
