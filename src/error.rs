//! Error types and handling for the EVSE controller
//!
//! This module defines the crate-level error type. Safety faults are never
//! errors: they are handled by the state machine and only surface through
//! the controller state.

use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, EvseError>;

/// Main error type for the EVSE controller
#[derive(Debug, Error)]
pub enum EvseError {
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

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl EvseError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        EvseError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        EvseError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        EvseError::Io {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        EvseError::Web {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        EvseError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for EvseError {
    fn from(err: std::io::Error) -> Self {
        EvseError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for EvseError {
    fn from(err: serde_yaml::Error) -> Self {
        EvseError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EvseError {
    fn from(err: serde_json::Error) -> Self {
        EvseError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = EvseError::config("test config error");
        assert!(matches!(err, EvseError::Config { .. }));

        let err = EvseError::web("bind failed");
        assert!(matches!(err, EvseError::Web { .. }));

        let err = EvseError::validation("field", "test validation error");
        assert!(matches!(err, EvseError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = EvseError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = EvseError::validation("current.max_amps", "must not exceed 63");
        assert_eq!(
            format!("{}", err),
            "Validation error: current.max_amps - must not exceed 63"
        );
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EvseError = io.into();
        assert!(matches!(err, EvseError::Io { .. }));
    }
}
