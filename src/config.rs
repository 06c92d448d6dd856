//! Configuration management for homevolt-local
//!
//! This module handles loading, validation, and management of the service
//! configuration from YAML files.

use crate::constants::{
    CACHE_EXPIRY_SECS, DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_TIMEOUT_SECS, DEFAULT_USERNAME,
    MAX_RETRIES, RETRY_BASE_DELAY_MS, RETRY_JITTER, RETRY_MAX_DELAY_MS,
};
use crate::error::{HomevoltError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Battery connection details
    pub device: DeviceConfig,

    /// Seconds between coordinator refreshes
    pub poll_interval_secs: u64,

    /// HTTP timeout, retry and cache tuning
    pub request: RequestConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// REST bridge binding configuration
    pub web: WebConfig,
}

/// Battery connection details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Hostname or IP, with or without scheme
    pub host: String,

    /// Basic auth username (only used when a password is set)
    pub username: Option<String>,

    /// Basic auth password; leave empty for an unprotected device
    pub password: Option<String>,
}

/// HTTP request behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Total per-request timeout in seconds
    pub timeout_secs: u64,

    /// Retries after the first attempt for cached reads
    pub max_retries: u32,

    /// Backoff base delay in milliseconds
    pub retry_base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    pub retry_max_delay_ms: u64,

    /// Upper bound of the random jitter fraction added to each delay
    pub retry_jitter: f64,

    /// Seconds a last-good response may stand in for a failed read
    pub cache_expiry_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Log file directory or path
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// REST bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "homevolt.local".to_string(),
            username: Some(DEFAULT_USERNAME.to_string()),
            password: None,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: MAX_RETRIES,
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: RETRY_MAX_DELAY_MS,
            retry_jitter: RETRY_JITTER,
            cache_expiry_secs: CACHE_EXPIRY_SECS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/var/log/homevolt".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            poll_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            request: RequestConfig::default(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
        }
    }
}

impl RequestConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub const fn cache_expiry(&self) -> Duration {
        Duration::from_secs(self.cache_expiry_secs)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "homevolt_config.yaml",
            "/data/homevolt_config.yaml",
            "/etc/homevolt/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.device.host.trim().is_empty() {
            return Err(HomevoltError::validation(
                "device.host",
                "Host cannot be empty",
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(HomevoltError::validation(
                "poll_interval_secs",
                "Must be greater than 0",
            ));
        }

        if self.request.timeout_secs == 0 {
            return Err(HomevoltError::validation(
                "request.timeout_secs",
                "Must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.request.retry_jitter) {
            return Err(HomevoltError::validation(
                "request.retry_jitter",
                "Must be between 0 and 1",
            ));
        }

        if self.request.retry_base_delay_ms > self.request.retry_max_delay_ms {
            return Err(HomevoltError::validation(
                "request.retry_base_delay_ms",
                "Must not exceed retry_max_delay_ms",
            ));
        }

        if self.web.port == 0 {
            return Err(HomevoltError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.request.timeout_secs, 10);
        assert_eq!(config.request.max_retries, 3);
        assert_eq!(config.request.cache_expiry_secs, 600);
        assert_eq!(config.device.username.as_deref(), Some("admin"));
        assert!(config.device.password.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.device.host = "  ".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.request.retry_jitter = 1.5;
        assert!(config.validate().is_err());

        config = Config::default();
        config.request.retry_base_delay_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "device:\n  host: 192.168.1.50\n  password: secret\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.device.host, "192.168.1.50");
        assert_eq!(config.device.password.as_deref(), Some("secret"));
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.web.port, 8089);
    }
}
