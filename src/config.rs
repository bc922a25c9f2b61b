//! Configuration management for PowerOcean
//!
//! This module handles loading, validation, and management of the
//! configuration from YAML files with support for environment variable
//! overrides of the credential fields.

mod defaults;

use crate::error::{PowerOceanError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cloud API credentials and device serial
    pub credentials: CredentialsConfig,

    /// REST endpoint settings
    pub api: ApiConfig,

    /// MQTT push channel settings
    pub mqtt: MqttConfig,

    /// Refresh cadence and merge policies
    pub coordinator: CoordinatorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Cloud API credentials
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Developer access key
    pub access_key: String,

    /// Developer secret key used as the HMAC key
    pub secret_key: String,

    /// Serial number of the hub
    pub device_sn: String,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("device_sn", &self.device_sn)
            .finish()
    }
}

/// How the signing nonce is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonceSetting {
    /// Six random digits per request
    Random,
    /// Always send `fixed_nonce`
    Fixed,
}

/// REST endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the cloud API host
    pub base_url: String,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Nonce strategy for request signing
    pub nonce: NonceSetting,

    /// Nonce used when `nonce` is `fixed`
    pub fixed_nonce: String,
}

/// MQTT channel names published by the broker for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MqttChannel {
    Quota,
    Status,
    Set,
    SetReply,
    Get,
    GetReply,
}

/// MQTT push channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Whether to fetch a broker certificate and subscribe to push updates
    pub enabled: bool,

    /// Prefix of the generated client id
    pub client_id_prefix: String,

    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,

    /// Delay before the event loop polls again after a transport error
    pub reconnect_delay_ms: u64,

    /// Channels subscribed under `/open/<account>/<sn>/`
    pub channels: Vec<MqttChannel>,
}

/// Which source wins when REST and MQTT carry the same field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// MQTT fields overwrite identically-named REST fields
    MqttWins,
    /// REST fields are kept; conflicting MQTT fields are dropped with a warning
    RestWins,
}

/// What happens to the historical fetch timestamp when the fetch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryFailurePolicy {
    /// Count the failed attempt; retry after the next full interval
    Advance,
    /// Leave the timestamp untouched; retry on the next refresh tick
    RetryNextTick,
}

/// Refresh cadence and merge policies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Snapshot polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Minimum seconds between historical summary fetches
    pub history_interval_secs: u64,

    /// Report code requested from the historical endpoint
    pub history_report_code: String,

    /// Key the historical summary is merged under (empty merges at root)
    pub history_key: String,

    /// Collision policy between REST and MQTT fields
    pub merge_policy: MergePolicy,

    /// Timestamp policy for failed historical fetches
    pub history_failure_policy: HistoryFailurePolicy,

    /// IANA time zone used to compute the historical window
    pub timezone: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (its directory receives the rolling files)
    pub file: String,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,

    /// Number of rotated files to keep
    pub backup_count: u32,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "powerocean.yaml",
            "/data/powerocean.yaml",
            "/etc/powerocean/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Overlay credentials handed over through the environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("POWEROCEAN_ACCESS_KEY") {
            self.credentials.access_key = v;
        }
        if let Some(v) = lookup("POWEROCEAN_SECRET_KEY") {
            self.credentials.secret_key = v;
        }
        if let Some(v) = lookup("POWEROCEAN_DEVICE_SN") {
            self.credentials.device_sn = v;
        }
        if let Some(v) = lookup("POWEROCEAN_MQTT_ENABLED") {
            self.mqtt.enabled = matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.credentials.access_key.trim().is_empty() {
            return Err(PowerOceanError::validation(
                "credentials.access_key",
                "Access key cannot be empty",
            ));
        }
        if self.credentials.secret_key.trim().is_empty() {
            return Err(PowerOceanError::validation(
                "credentials.secret_key",
                "Secret key cannot be empty",
            ));
        }
        if self.credentials.device_sn.trim().is_empty() {
            return Err(PowerOceanError::validation(
                "credentials.device_sn",
                "Device serial cannot be empty",
            ));
        }

        if self.api.base_url.trim().is_empty() {
            return Err(PowerOceanError::validation(
                "api.base_url",
                "Base URL cannot be empty",
            ));
        }
        if self.api.request_timeout_ms == 0 {
            return Err(PowerOceanError::validation(
                "api.request_timeout_ms",
                "Must be greater than 0",
            ));
        }
        if self.api.nonce == NonceSetting::Fixed && self.api.fixed_nonce.is_empty() {
            return Err(PowerOceanError::validation(
                "api.fixed_nonce",
                "Fixed nonce mode requires a nonce value",
            ));
        }

        if self.mqtt.enabled && self.mqtt.channels.is_empty() {
            return Err(PowerOceanError::validation(
                "mqtt.channels",
                "At least one channel is required when MQTT is enabled",
            ));
        }

        if self.coordinator.poll_interval_ms == 0 {
            return Err(PowerOceanError::validation(
                "coordinator.poll_interval_ms",
                "Must be greater than 0",
            ));
        }
        if self.coordinator.history_interval_secs == 0 {
            return Err(PowerOceanError::validation(
                "coordinator.history_interval_secs",
                "Must be greater than 0",
            ));
        }
        if self.coordinator.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(PowerOceanError::validation(
                "coordinator.timezone",
                "Unknown time zone",
            ));
        }

        Ok(())
    }
}
