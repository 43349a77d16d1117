//! Error types for worker modules

use thiserror::Error;

/// Errors a worker module can return to the host
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Missing key: {0}")]
    MissingKey(String),

    #[error("Invalid field {field}: expected {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },

    #[error("Initialization failed: {0}")]
    Init(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Short machine-readable kind, used in IPC replies and logs
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::MissingKey(_) => "missing_key",
            HandlerError::InvalidField { .. } => "invalid_field",
            HandlerError::Init(_) => "init",
            HandlerError::Serialization(_) => "serialization",
            HandlerError::Internal(_) => "internal",
        }
    }

    /// Whether the error was caused by the request data rather than the module
    pub fn is_client_error(&self) -> bool {
        matches!(self, HandlerError::MissingKey(_) | HandlerError::InvalidField { .. })
    }
}
