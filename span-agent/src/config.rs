//! Configuration for the agent.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use span_core::{CaptureServiceConfig, CommandServiceConfig, FrameEncoder};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub relay: RelayConfig,
    pub screen: ScreenConfig,
    pub commands: CommandsConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL of the relay, e.g. `http://relay.example.org:8080`.
    pub url: String,
    pub connect_timeout_ms: u64,
    /// Whole-request deadline.
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Frames per second; fractions allowed.
    pub fps: f64,
    /// Frames larger than this are downscaled to exactly this size.
    pub width: u32,
    pub height: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First backoff delay after a failure.
    pub delay_ms: u64,
    /// Backoff ceiling.
    pub max_delay_ms: u64,
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

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            fps: 1.0,
            width: 800,
            height: 600,
            quality: 50,
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_ms: 2_000,
            max_delay_ms: 30_000,
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

impl AgentConfig {
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

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry.delay_ms.max(1))
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.retry.max_delay_ms.max(self.retry.delay_ms).max(1))
    }

    pub fn encoder(&self) -> FrameEncoder {
        FrameEncoder::new(self.screen.width, self.screen.height, self.screen.quality)
    }

    pub fn to_capture_config(&self) -> CaptureServiceConfig {
        CaptureServiceConfig {
            fps: self.screen.fps.clamp(0.05, 30.0),
            retry_base: self.retry_base(),
            retry_max: self.retry_max(),
        }
    }

    pub fn to_command_config(&self) -> CommandServiceConfig {
        CommandServiceConfig {
            poll_interval: Duration::from_millis(self.commands.poll_interval_ms.max(10)),
            retry_base: self.retry_base(),
            retry_max: self.retry_max(),
        }
    }
}
