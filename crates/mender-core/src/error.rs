//! Unified error types for Mender

use thiserror::Error;

/// Unified error type for all Mender operations
#[derive(Error, Debug)]
pub enum MenderError {
    // Container runtime errors
    #[error("Docker command failed: {0}")]
    Docker(String),

    // Text-generation backend errors
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend timed out after {0} seconds")]
    BackendTimeout(u64),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Search error: {0}")]
    Search(String),

    // Patch errors
    #[error("Patch tool failed: {0}")]
    Patch(String),

    #[error("Service rejected: {0}")]
    ServiceRejected(String),

    // Finance errors
    #[error("Finance check failed: {0}")]
    Finance(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Control surface errors
    #[error("Server error: {0}")]
    Server(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using MenderError
pub type Result<T> = std::result::Result<T, MenderError>;
