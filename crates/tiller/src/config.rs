//! Server configuration.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `TILLER_*` environment variables. CLI flags override the final host
//! and port.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TillerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Data directory (workdirs, bridge cursors).
    pub data_dir: PathBuf,
    /// Adapter to drive turns with ("echo" is the built-in default).
    pub adapter: String,
    /// Heartbeat period while a turn is active, in seconds.
    pub heartbeat_secs: u64,
    /// SSE keepalive comment interval, in seconds.
    pub sse_keepalive_secs: u64,
    /// Retention window: events kept per session before eviction.
    pub max_events_per_session: usize,
    /// Cap on queued follow-up inputs per session.
    pub pending_input_limit: usize,
    /// Bridge poll loop interval when no new events are available, in ms.
    pub bridge_poll_interval_ms: u64,
}

impl Default for TillerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7770,
            data_dir: default_data_dir(),
            adapter: "echo".to_string(),
            heartbeat_secs: 5,
            sse_keepalive_secs: 15,
            max_events_per_session: 10_000,
            pending_input_limit: 32,
            bridge_poll_interval_ms: 1_000,
        }
    }
}

impl TillerConfig {
    /// Load configuration from defaults, an optional file, and `TILLER_*`
    /// environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .add_source(Config::try_from(&defaults).context("serializing default config")?);

        if let Some(path) = config_path {
            builder = builder.add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        let config = builder
            .add_source(Environment::with_prefix("TILLER").separator("__"))
            .build()
            .context("building configuration")?;

        config
            .try_deserialize()
            .context("deserializing configuration")
    }

    pub fn heartbeat_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_secs)
    }

    pub fn bridge_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.bridge_poll_interval_ms)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("tiller"))
        .unwrap_or_else(|| PathBuf::from("data"))
}
