//! Error types and handling for FerroRep
//!
//! Only run-level faults are errors. Per-item copy failures are collected as
//! [`FailureRecord`](crate::FailureRecord)s, verification mismatches are logged,
//! and cancellation is reported through the result status.

use crate::RunId;

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Low severity - operation can continue
    Low,
    /// Medium severity - operation should be retried
    Medium,
    /// High severity - operation should be aborted
    High,
    /// Critical severity - entire process should be terminated
    Critical,
}

/// Error context providing additional information
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorContext {
    /// Operation that was being performed
    pub operation: String,
    /// Additional context information
    pub details: std::collections::HashMap<String, String>,
    /// Timestamp when the error occurred
    #[cfg(feature = "std")]
    pub timestamp: std::time::SystemTime,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            details: std::collections::HashMap::new(),
            #[cfg(feature = "std")]
            timestamp: std::time::SystemTime::now(),
        }
    }

    /// Add a detail to the context
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Render the context as `operation (k=v, ...)` with keys sorted
    pub fn describe(&self) -> String {
        if self.details.is_empty() {
            return self.operation.clone();
        }
        let mut pairs: Vec<_> = self.details.iter().collect();
        pairs.sort();
        let rendered: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{} ({})", self.operation, rendered.join(", "))
    }
}

/// Main error type for FerroRep operations
#[derive(thiserror::Error, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// The run could not be set up; nothing was written
    #[error("Setup failure: {message}")]
    Setup {
        /// What was missing or invalid
        message: String,
    },

    /// The privileged command channel is unreachable or died mid-run
    #[error("Channel failure: {message}")]
    Channel {
        /// Error message describing the channel failure
        message: String,
    },

    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// No active run with this identifier
    #[error("Unknown run: {run_id}")]
    UnknownRun {
        /// Identifier that was looked up
        run_id: RunId,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing source, missing subtree or unavailable pinned mode
    Setup,
    /// Privileged channel errors
    Channel,
    /// I/O related errors
    Io,
    /// Configuration errors
    Config,
    /// Lookup of a run that is not registered
    UnknownRun,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Setup { .. } => ErrorKind::Setup,
            Self::Channel { .. } => ErrorKind::Channel,
            Self::Io { .. } => ErrorKind::Io,
            Self::Config { .. } => ErrorKind::Config,
            Self::UnknownRun { .. } => ErrorKind::UnknownRun,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Setup { .. } => ErrorSeverity::High,
            Self::Channel { .. } => ErrorSeverity::Critical,
            Self::Io { .. } => ErrorSeverity::Medium,
            Self::Config { .. } => ErrorSeverity::High,
            Self::UnknownRun { .. } => ErrorSeverity::Low,
            Self::Other { .. } => ErrorSeverity::Medium,
        }
    }

    /// Check if re-invoking the same request may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { message } => {
                message.contains("Interrupted")
                    || message.contains("WouldBlock")
                    || message.contains("timed out")
            }
            Self::Channel { .. } | Self::Other { .. } => true,
            Self::Setup { .. } | Self::Config { .. } | Self::UnknownRun { .. } => false,
        }
    }

    /// Create a new setup error
    pub fn setup<S: Into<String>>(message: S) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }

    /// Create a new channel error
    pub fn channel<S: Into<String>>(message: S) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Prefix the message with a rendered [`ErrorContext`]
    pub fn with_context(self, context: &ErrorContext) -> Self {
        let prefix = context.describe();
        match self {
            Self::Setup { message } => Self::setup(format!("{prefix}: {message}")),
            Self::Channel { message } => Self::channel(format!("{prefix}: {message}")),
            Self::Io { message } => Self::io(format!("{prefix}: {message}")),
            Self::Config { message } => Self::config(format!("{prefix}: {message}")),
            Self::Other { message } => Self::other(format!("{prefix}: {message}")),
            unknown @ Self::UnknownRun { .. } => unknown,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
