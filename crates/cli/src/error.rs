//! Error types for CLI operations.

use std::path::PathBuf;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Event input could not be opened or read
    #[error("Failed to read events from {path}: {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One input line is not a valid event
    #[error("Invalid event on line {line}: {message}")]
    EventParse { line: usize, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn input_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::InputRead {
            path: path.into(),
            source,
        }
    }

    pub fn event_parse(line: usize, message: impl Into<String>) -> Self {
        Self::EventParse {
            line,
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
