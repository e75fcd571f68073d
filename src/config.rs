//! Switchyard Configuration
//!
//! This module provides configuration structures for the Switchyard
//! broker cluster coordinator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main Switchyard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    /// Cloud provider configuration
    pub cloud: CloudConfig,

    /// Failover behavior configuration
    #[serde(default)]
    pub failover: FailoverConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cloud provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Which provider adapter to use ("http" or "mock")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of the cloud control endpoint (required for "http")
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token for the cloud control endpoint
    #[serde(default)]
    pub api_token: Option<String>,

    /// Request timeout for provider calls in seconds
    #[serde(default = "default_cloud_timeout")]
    pub request_timeout_secs: u64,
}

/// Failover behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Health probe timeout in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Path probed on the reported leader
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Path on peers receiving the new-leader push
    #[serde(default = "default_notify_path")]
    pub notify_path: String,

    /// Port used for a probe when the reported address has no registry entry
    #[serde(default = "default_broker_port")]
    pub default_broker_port: u16,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log to file path (optional)
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_provider() -> String {
    "http".to_string()
}

fn default_cloud_timeout() -> u64 {
    30
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_probe_path() -> String {
    "/health".to_string()
}

fn default_notify_path() -> String {
    "/leader-changed".to_string()
}

fn default_broker_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_path: default_probe_path(),
            notify_path: default_notify_path(),
            default_broker_port: default_broker_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            cors_enabled: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl SwitchyardConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: SwitchyardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        match self.cloud.provider.as_str() {
            "http" => {
                if self.cloud.endpoint.as_deref().unwrap_or("").is_empty() {
                    return Err(crate::Error::Config(
                        "cloud.endpoint is required when cloud.provider = \"http\"".into(),
                    ));
                }
            }
            "mock" => {}
            other => {
                return Err(crate::Error::Config(format!(
                    "unknown cloud.provider '{}' (expected \"http\" or \"mock\")",
                    other
                )));
            }
        }

        if self.failover.probe_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "failover.probe_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.api.enabled && self.api.bind_address.is_empty() {
            return Err(crate::Error::Config("api.bind_address cannot be empty".into()));
        }

        Ok(())
    }

    /// Get the health probe timeout as Duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.failover.probe_timeout_ms)
    }

    /// Get the cloud request timeout as Duration
    pub fn cloud_timeout(&self) -> Duration {
        Duration::from_secs(self.cloud.request_timeout_secs)
    }
}
