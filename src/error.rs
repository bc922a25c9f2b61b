//! Error types and handling for PowerOcean
//!
//! This module defines the error types used throughout the crate, providing
//! consistent error handling and reporting across the cloud client, the MQTT
//! subscriber and the coordinator.

use thiserror::Error;

/// Result type alias for PowerOcean operations
pub type Result<T> = std::result::Result<T, PowerOceanError>;

/// Main error type for PowerOcean
#[derive(Debug, Clone, Error)]
pub enum PowerOceanError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Network-related errors (transport failure, non-2xx status)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Cloud API rejected the request (envelope code other than "0")
    #[error("API error (code {code}): {message}")]
    Api { code: String, message: String },

    /// MQTT broker errors
    #[error("MQTT error: {message}")]
    Mqtt { message: String },

    /// Push payload could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Startup failed before any state was available
    #[error("Initialization failed: {message}")]
    Init { message: String },

    /// The coordinator task is no longer running
    #[error("Coordinator stopped: {message}")]
    Shutdown { message: String },
}

impl PowerOceanError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a new API error from an envelope code and message
    pub fn api<C: Into<String>, S: Into<String>>(code: C, message: S) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a new MQTT error
    pub fn mqtt<S: Into<String>>(message: S) -> Self {
        Self::Mqtt {
            message: message.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a new initialization error
    pub fn init<S: Into<String>>(message: S) -> Self {
        Self::Init {
            message: message.into(),
        }
    }

    /// Create a new shutdown error
    pub fn shutdown<S: Into<String>>(message: S) -> Self {
        Self::Shutdown {
            message: message.into(),
        }
    }

    /// Whether the error came from the network layer (transport or timeout)
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

impl From<std::io::Error> for PowerOceanError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for PowerOceanError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<serde_json::Error> for PowerOceanError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<reqwest::Error> for PowerOceanError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else if err.is_decode() {
            Self::serialization(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for PowerOceanError {
    fn from(err: chrono::ParseError) -> Self {
        Self::validation("datetime", err.to_string().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PowerOceanError::config("test config error");
        assert!(matches!(err, PowerOceanError::Config { .. }));

        let err = PowerOceanError::api("1006", "signature mismatch");
        assert!(matches!(err, PowerOceanError::Api { .. }));

        let err = PowerOceanError::validation("field", "test validation error");
        assert!(matches!(err, PowerOceanError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = PowerOceanError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = PowerOceanError::api("8521", "device offline");
        assert_eq!(format!("{}", err), "API error (code 8521): device offline");

        let err = PowerOceanError::validation("test_field", "invalid value");
        assert_eq!(
            format!("{}", err),
            "Validation error: test_field - invalid value"
        );
    }

    #[test]
    fn transport_classification() {
        assert!(PowerOceanError::network("down").is_transport());
        assert!(PowerOceanError::timeout("slow").is_transport());
        assert!(!PowerOceanError::api("1", "bad").is_transport());
    }
}
