use std::time::Duration;

use serde::Deserialize;

use crate::utils::constants::*;

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    #[serde(flatten)]
    pub store: StoreSettings,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub logging: Option<LoggingConfig>,
}

/// ================================
/// Token store tuning
/// ================================
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// subtracted from ttl when scheduling a refresh
    #[serde(default = "default_buffer_interval_seconds")]
    pub buffer_interval_seconds: u64,
    /// lower bound for the refresh delay,
    /// invariant: keeps a ttl shorter than the buffer from refreshing in a loop
    #[serde(default = "default_min_refresh_delay_ms")]
    pub min_refresh_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_restart_window_seconds")]
    pub restart_window_seconds: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            buffer_interval_seconds: DEFAULT_BUFFER_INTERVAL_SECS,
            min_refresh_delay_ms: DEFAULT_MIN_REFRESH_DELAY_MS,
            default_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            max_restarts: DEFAULT_MAX_RESTARTS,
            restart_window_seconds: DEFAULT_RESTART_WINDOW_SECS,
        }
    }
}

impl StoreSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn min_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.min_refresh_delay_ms)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            is_enabled: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "json".to_string())
            .to_lowercase()
            .as_str()
        {
            "compact" | "text" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

fn default_buffer_interval_seconds() -> u64 {
    DEFAULT_BUFFER_INTERVAL_SECS
}

fn default_min_refresh_delay_ms() -> u64 {
    DEFAULT_MIN_REFRESH_DELAY_MS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

fn default_max_restarts() -> u32 {
    DEFAULT_MAX_RESTARTS
}

fn default_restart_window_seconds() -> u64 {
    DEFAULT_RESTART_WINDOW_SECS
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> String {
    "8080".to_string()
}
