//! Error types for the thin client
//!
//! Provides a unified error type for codec, protocol, session and pool
//! operations.

use thiserror::Error;

/// Result type alias using ThinError
pub type Result<T> = std::result::Result<T, ThinError>;

/// Unified error type for thin client operations
#[derive(Debug, Error)]
pub enum ThinError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Binary Object Errors
    // -------------------------------------------------------------------------
    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Cannot encode {value} as {type_name}")]
    TypeMismatch {
        type_name: &'static str,
        value: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Packet / Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Missing request field: {0}")]
    MissingField(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Session Errors
    // -------------------------------------------------------------------------
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Operation {operation} failed: {message}")]
    RemoteOperation {
        operation: &'static str,
        status: i32,
        message: String,
    },

    // -------------------------------------------------------------------------
    // Pool Errors
    // -------------------------------------------------------------------------
    #[error("Pool argument error: {0}")]
    PoolArgument(String),

    #[error("Pool worker failed: {0}")]
    Worker(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ThinError {
    /// Shorthand for a truncated-buffer serialization error
    pub(crate) fn truncated(what: &str, offset: usize, needed: usize, available: usize) -> Self {
        ThinError::Serialization(format!(
            "{} truncated at offset {}: need {} bytes, {} available",
            what, offset, needed, available
        ))
    }
}
