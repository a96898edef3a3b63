//! Error types and handling for Obol
//!
//! This module defines the error types used throughout the billing engine,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Obol operations
pub type Result<T> = std::result::Result<T, ObolError>;

/// Main error type for Obol
#[derive(Debug, Error)]
pub enum ObolError {
    /// Tariff document structure errors
    #[error("Tariff schema error: {message}")]
    Schema { message: String },

    /// Rate unit parsing and normalization errors
    #[error("Unit error: {unit} - {message}")]
    Unit { unit: String, message: String },

    /// Formula parsing and evaluation errors
    #[error("Formula error: {message}")]
    Formula { message: String },

    /// Unresolvable time zone names
    #[error("Timezone error: unknown time zone '{name}'")]
    Timezone { name: String },

    /// Result store access errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl ObolError {
    /// Create a new tariff schema error
    pub fn schema<S: Into<String>>(message: S) -> Self {
        ObolError::Schema {
            message: message.into(),
        }
    }

    /// Create a new unit error
    pub fn unit<S: Into<String>>(unit: S, message: S) -> Self {
        ObolError::Unit {
            unit: unit.into(),
            message: message.into(),
        }
    }

    /// Create a new formula error
    pub fn formula<S: Into<String>>(message: S) -> Self {
        ObolError::Formula {
            message: message.into(),
        }
    }

    /// Create a new timezone error
    pub fn timezone<S: Into<String>>(name: S) -> Self {
        ObolError::Timezone { name: name.into() }
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        ObolError::Storage {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        ObolError::Config {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        ObolError::Serialization {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        ObolError::Io {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ObolError {
    fn from(err: std::io::Error) -> Self {
        ObolError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ObolError {
    fn from(err: serde_yaml::Error) -> Self {
        ObolError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ObolError {
    fn from(err: serde_json::Error) -> Self {
        ObolError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for ObolError {
    fn from(err: chrono::ParseError) -> Self {
        ObolError::schema(format!("invalid date or time value: {}", err))
    }
}
