// ABOUTME: Application configuration loaded from TOML with environment overrides
// Covers the relay endpoint, caller identity, timeouts, reconnect policy and logging

//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding [`AppConfig::relay_url`]
pub const RELAY_URL_ENV: &str = "INDIREX_RELAY_URL";

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`AppConfig`]
    #[error("Invalid config file {path}: {source}")]
    Parse {
        /// File that failed
        path: PathBuf,
        /// Parser error with location
        source: toml::de::Error,
    },

    /// The relay URL is not a WebSocket URL
    #[error("Relay URL must start with ws:// or wss://, got {0:?}")]
    InvalidRelayUrl(String),
}

/// Settings for the terminal client. Every field has a default, so a
/// partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// WebSocket endpoint of the SSH relay, shared by every session
    pub relay_url: String,
    /// Port used when none is given on the command line
    pub default_port: u16,
    /// Operator identity; falls back to `INDIREX_USER_ID` when unset
    pub user_id: Option<String>,
    /// WebSocket handshake timeout
    pub connect_timeout_secs: u64,
    /// Automatic reconnect behavior
    pub reconnect: ReconnectPolicy,
    /// Log file settings
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:8080/ssh".to_string(),
            default_port: 22,
            user_id: None,
            connect_timeout_secs: 10,
            reconnect: ReconnectPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// How the terminal host retries after a session ends.
///
/// Attempts are numbered from 1. The delay before attempt `n` is
/// `initial_delay_ms * multiplier^(n-1)`, capped at `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// 0 disables automatic reconnects
    pub max_attempts: u32,
    /// Delay before the first attempt
    pub initial_delay_ms: u64,
    /// Upper bound for any delay
    pub max_delay_ms: u64,
    /// Growth factor between attempts; values below 1 are treated as 1
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    /// Whether any automatic attempt is allowed
    pub const fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before the given attempt, or `None` once attempts are exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let scaled = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = scaled.min(self.max_delay_ms as f64);
        Some(Duration::from_millis(capped.round() as u64))
    }
}

/// Where and how much to log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for log files; defaults to the platform data directory
    pub directory: Option<PathBuf>,
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            filter: "indirex_term=info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Default config file location for this platform
    pub fn config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply `INDIREX_RELAY_URL` and `INDIREX_USER_ID` from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides looked up through `lookup`; blank values are ignored
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(RELAY_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.relay_url = url.trim().to_string();
        }
        if let Some(user) = lookup(crate::identity::USER_ID_ENV).filter(|v| !v.trim().is_empty()) {
            self.user_id = Some(user.trim().to_string());
        }
    }

    /// Check the relay URL scheme
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay_url.starts_with("ws://") || self.relay_url.starts_with("wss://") {
            Ok(())
        } else {
            Err(ConfigError::InvalidRelayUrl(self.relay_url.clone()))
        }
    }

    /// Handshake timeout as a [`Duration`]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Configured log directory, or the platform data directory
    pub fn log_dir(&self) -> PathBuf {
        self.logging.directory.clone().unwrap_or_else(|| {
            project_dirs().map_or_else(
                || PathBuf::from(".indirex-term").join("logs"),
                |dirs| dirs.data_local_dir().join("logs"),
            )
        })
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "indirex", "indirex-term")
}
