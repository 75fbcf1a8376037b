//! Error types for the TLI analyzer
//!
//! The correlation pipeline itself never fails: unparsable lines are counted,
//! identity anomalies are logged and unresolved culprits are reported as such.
//! Errors only arise at the edges (reading input, loading configuration,
//! serializing the report). We use `thiserror` for automatic `Display` and
//! `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for analyzer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the TLI analyzer
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (reading the log stream, writing the report)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Report serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration file could not be read, parsed or validated
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Caller supplied an invalid value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Build a configuration error from any displayable message
    pub fn config(message: impl Into<String>) -> Self {
        Error::ConfigError(message.into())
    }

    /// Build an invalid input error from any displayable message
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::ConfigError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let err = Error::IoError(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        let msg = err.to_string();
        assert!(msg.contains("I/O error"));
    }

    #[test]
    fn test_error_display_serialization() {
        let err = Error::SerializationError("invalid format".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Serialization error"));
        assert!(msg.contains("invalid format"));
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::config("unknown log format 'xml'");
        let msg = err.to_string();
        assert!(msg.contains("Configuration error"));
        assert!(msg.contains("xml"));
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::invalid_input("no input provided");
        assert!(err.to_string().contains("Invalid input"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let result: Result<serde_json::Value> =
            serde_json::from_str("{not json").map_err(|e| e.into());
        assert!(matches!(result, Err(Error::SerializationError(_))));
    }

    #[test]
    fn test_error_from_serde_yaml() {
        let result: Result<serde_yaml::Value> =
            serde_yaml::from_str("key: [unclosed").map_err(|e| e.into());
        assert!(matches!(result, Err(Error::SerializationError(_))));
    }

    #[test]
    fn test_error_from_toml() {
        let result: Result<toml::Value> = toml::from_str("= broken").map_err(|e| e.into());
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
