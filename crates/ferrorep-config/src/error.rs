//! Error types for configuration management

use ferrorep_types::Error as FerrorepError;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist
    #[error("Config file '{path}' not found")]
    NotFound {
        /// Requested path
        path: PathBuf,
    },

    /// Writing a configuration file failed
    #[error("I/O error writing config file '{path}': {source}")]
    Io {
        /// Path to the configuration file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A source could not be merged or deserialized into [`crate::Config`]
    #[error("Failed to load configuration: {message}")]
    Layering {
        /// Message from the layering backend
        message: String,
    },

    /// YAML, TOML or JSON encoding failed
    #[error("Failed to encode configuration: {message}")]
    Format {
        /// Encoder message
        message: String,
    },

    /// A loaded value is out of range
    #[error("Configuration validation failed: {message}")]
    Validation {
        /// Validation error message
        message: String,
    },

    /// A required entry is empty
    #[error("Missing required configuration: {key}")]
    MissingRequired {
        /// Dotted key, e.g. `channels.root_launcher`
        key: String,
    },

    /// A single entry has an invalid value
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue {
        /// Dotted key
        key: String,
        /// Why the value was rejected
        message: String,
    },

    /// `FERROREP_CONFIG` or an override variable is unusable
    #[error("Environment variable error: {message}")]
    Environment {
        /// Error message
        message: String,
    },
}

impl From<config::ConfigError> for ConfigError {
    fn from(error: config::ConfigError) -> Self {
        Self::Layering {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        Self::format(format!("JSON: {error}"))
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::format(format!("YAML: {error}"))
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(error: toml::ser::Error) -> Self {
        Self::format(format!("TOML: {error}"))
    }
}

impl From<ConfigError> for FerrorepError {
    fn from(error: ConfigError) -> Self {
        FerrorepError::config(error.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new missing required error
    pub fn missing_required<S: Into<String>>(key: S) -> Self {
        Self::MissingRequired { key: key.into() }
    }

    /// Create a new invalid value error
    pub fn invalid_value<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new environment error
    pub fn environment<S: Into<String>>(message: S) -> Self {
        Self::Environment {
            message: message.into(),
        }
    }

    /// Create a new encoding error
    pub fn format<S: Into<String>>(message: S) -> Self {
        Self::Format {
            message: message.into(),
        }
    }
}
