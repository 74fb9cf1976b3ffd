//! Error types and handling infrastructure for logsift.
//!
//! This module provides a centralized error handling system using `thiserror` for
//! the library error type. The binary layers `anyhow` on top for context.
//!
//! ## Error classes
//!
//! - **I/O**: the file is missing, unreadable, or vanished mid-read
//! - **Invalid file**: the input fails the `.log` / regular-file / text precondition
//! - **Pattern syntax**: a malformed filter expression, reported before any scan starts
//! - **Unexpected failure**: a fault caught at a background task boundary
//!
//! Cancellation is not an error. It is reported through
//! [`Outcome::Cancelled`](crate::task::Outcome::Cancelled).

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for logsift operations.
#[derive(Error, Debug)]
pub enum LogsiftError {
    /// File system related errors (file not found, permission denied, etc.)
    #[error("File operation failed: {message}")]
    FileError {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// The path exists but is not an acceptable log file
    #[error("Invalid log file {path}: {reason}")]
    InvalidFile { path: PathBuf, reason: String },

    /// Filter expression could not be compiled
    #[error("Invalid pattern '{pattern}': {message}")]
    PatternSyntax { pattern: String, message: String },

    /// A background task faulted in a way it could not report itself
    #[error("Unexpected failure: {message}")]
    UnexpectedFailure { message: String },

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Invalid arguments or session misuse
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

/// Standard Result type for logsift operations.
pub type Result<T> = std::result::Result<T, LogsiftError>;

impl LogsiftError {
    /// Create a FileError from an io::Error with additional context
    pub fn file_error(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileError {
            message: message.into(),
            source,
        }
    }

    /// Create an InvalidFile error for a rejected input path
    pub fn invalid_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a PatternSyntax error for a rejected filter expression
    pub fn pattern_syntax(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PatternSyntax {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create an UnexpectedFailure carrying a diagnostic message
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedFailure {
            message: message.into(),
        }
    }

    /// Create a ConfigError with a descriptive message
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create an InvalidArgument error with a descriptive message
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// True for errors rooted in the file system.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::FileError { .. })
    }
}

// Automatic conversion from io::Error to LogsiftError
impl From<std::io::Error> for LogsiftError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileError {
                message: "File not found".to_string(),
                source: err,
            },
            std::io::ErrorKind::PermissionDenied => Self::FileError {
                message: "Permission denied".to_string(),
                source: err,
            },
            _ => Self::FileError {
                message: "IO operation failed".to_string(),
                source: err,
            },
        }
    }
}
