//! Protocol error types

use thiserror::Error;

/// Protocol error types
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Message too large
    #[error("Message size {0} exceeds maximum {1}")]
    MessageTooLarge(usize, usize),
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
