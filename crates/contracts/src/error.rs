//! Layered error definitions
//!
//! Categorized by source: config / session / encoding

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Session Errors =====
    /// Could not establish (or re-establish) a broker session
    #[error("destination '{destination}' connection error: {message}")]
    SessionConnection {
        destination: String,
        message: String,
    },

    /// The broker rejected or failed a single send
    #[error("destination '{destination}' send error: {message}")]
    SessionSend {
        destination: String,
        message: String,
    },

    /// Operation attempted on a session that is not open
    #[error("destination '{destination}' session is not open")]
    SessionNotOpen { destination: String },

    // ===== Encoding Errors =====
    /// Event could not be turned into a payload
    #[error("encoding error ({format}): {message}")]
    Encoding { format: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create session connection error
    pub fn session_connection(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SessionConnection {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Create session send error
    pub fn session_send(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SessionSend {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Create encoding error
    pub fn encoding(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encoding {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Whether the error means the underlying connection is unusable
    ///
    /// Connection-level failures move a session to `Faulted`; the next attempt
    /// re-opens it before sending.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Self::SessionConnection { .. } | Self::SessionNotOpen { .. } | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_destination() {
        let err = ContractError::session_connection("localhost:9093", "connection refused");
        assert_eq!(
            err.to_string(),
            "destination 'localhost:9093' connection error: connection refused"
        );
    }

    #[test]
    fn test_connection_level_classification() {
        assert!(ContractError::session_connection("a", "down").is_connection_level());
        assert!(ContractError::SessionNotOpen {
            destination: "a".into()
        }
        .is_connection_level());
        assert!(!ContractError::session_send("a", "rejected").is_connection_level());
        assert!(!ContractError::encoding("json", "bad").is_connection_level());
    }
}
