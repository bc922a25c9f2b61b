use crate::error::{PowerOceanError, Result};
use tracing::Level;

/// Parse log level string to tracing Level
///
/// Accepts the Python-style `WARNING`/`CRITICAL` spellings used by older
/// configuration files alongside the tracing names.
pub fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.trim().to_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" | "CRITICAL" => Ok(Level::ERROR),
        _ => Err(PowerOceanError::config(format!(
            "Invalid log level: {}",
            level_str
        ))),
    }
}
