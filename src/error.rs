//! Error types for realtimeify
//!
//! This module defines all error types used throughout the crate, naming the
//! real-time facility involved so every diagnostic says which step failed.

use crate::guards::Facility;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for realtimeify operations
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// The calling process is not privileged
    #[error("Permission denied: real-time setup requires root")]
    PermissionDenied,

    /// The number of online processors could not be determined
    #[error("CPU topology unavailable: {0}")]
    TopologyUnavailable(String),

    /// A core index outside the online range was requested
    #[error("Invalid core {core}: only {count} cores online")]
    InvalidCore { core: usize, count: usize },

    /// A setup step was rejected by the platform
    #[error("Could not acquire {facility}: {message}")]
    ResourceAcquireFailed { facility: Facility, message: String },

    /// A teardown step was rejected by the platform
    #[error("Could not release {facility}: {message}")]
    ResourceReleaseFailed { facility: Facility, message: String },

    /// The external isolation tool returned a nonzero status
    #[error("Isolation tool '{command}' failed: {message}")]
    CollaboratorFailed { command: String, message: String },

    /// I/O error on a platform file
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Multiple errors occurred
    #[error("Multiple errors occurred ({count} errors)")]
    MultipleErrors {
        count: usize,
        errors: Vec<RealtimeError>,
    },
}

impl RealtimeError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap any error as a failed acquisition of `facility`
    pub fn acquire(facility: Facility, message: impl ToString) -> Self {
        Self::ResourceAcquireFailed {
            facility,
            message: message.to_string(),
        }
    }

    /// Wrap any error as a failed release of `facility`
    pub fn release(facility: Facility, message: impl ToString) -> Self {
        Self::ResourceReleaseFailed {
            facility,
            message: message.to_string(),
        }
    }

    /// Create a collaborator failure
    pub fn collaborator(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CollaboratorFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// The facility this error refers to, if any
    pub fn facility(&self) -> Option<Facility> {
        match self {
            Self::ResourceAcquireFailed { facility, .. }
            | Self::ResourceReleaseFailed { facility, .. } => Some(*facility),
            _ => None,
        }
    }

    /// Check if this error is a permission issue
    pub fn is_permission_error(&self) -> bool {
        match self {
            Self::PermissionDenied => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}

/// Result type alias for realtimeify operations
pub type Result<T> = std::result::Result<T, RealtimeError>;

impl From<std::io::Error> for RealtimeError {
    fn from(err: std::io::Error) -> Self {
        RealtimeError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        RealtimeError::ConfigError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| RealtimeError::io(path, e))
    }
}

/// Folds a list of errors into one: `None` when empty, the error itself when
/// alone, `MultipleErrors` otherwise.
pub fn fold_errors(mut errors: Vec<RealtimeError>) -> Option<RealtimeError> {
    match errors.len() {
        0 => None,
        1 => errors.pop(),
        count => Some(RealtimeError::MultipleErrors { count, errors }),
    }
}
