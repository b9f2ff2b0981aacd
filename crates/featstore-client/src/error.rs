//! Error types for the featstore SDK
//!
//! Every error aborts the current call; the SDK never retries internally.
//! Ingestion errors identify the phase they occurred in (reading, readiness,
//! encoding, delivery) through their variant, and delivery timeouts carry the
//! partial statistics gathered before the failure.

use crate::ingest::IngestStats;
use thiserror::Error;

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the featstore SDK
#[derive(Debug, Error)]
pub enum Error {
    // ------------------------------------------------------------------
    // Reading phase
    // ------------------------------------------------------------------
    /// The input type or file extension is not a recognized source
    #[error("Unsupported ingestion source: {0}")]
    UnsupportedSource(String),

    /// The input could not be converted to the staging representation
    #[error("Source conversion error: {0}")]
    Conversion(String),

    // ------------------------------------------------------------------
    // Readiness phase
    // ------------------------------------------------------------------
    /// The feature set did not become ready before the deadline
    #[error("Timed out waiting for feature set '{reference}' to become ready")]
    ReadinessTimeout { reference: String },

    // ------------------------------------------------------------------
    // Encoding phase
    // ------------------------------------------------------------------
    /// A row failed entity/feature schema validation
    #[error("Row {row} failed encoding on column '{column}': {message}")]
    RowEncoding {
        row: usize,
        column: String,
        message: String,
    },

    // ------------------------------------------------------------------
    // Delivery phase
    // ------------------------------------------------------------------
    /// A per-chunk flush did not complete within the remaining deadline
    #[error("Delivery flush timed out ({stats})")]
    DeliveryTimeout { stats: IngestStats },

    /// The broker connection could not be established
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// The feature set has no recognized streaming sink
    #[error("Feature set '{reference}' has unsupported sink type '{source_type}'")]
    UnsupportedSink {
        reference: String,
        source_type: String,
    },

    // ------------------------------------------------------------------
    // Ambient
    // ------------------------------------------------------------------
    /// Control-plane channel establishment failed or timed out
    #[error("Connection error: {0}")]
    Connection(String),

    /// Server-side failure, wrapped with the server-provided detail message
    #[error("Server error: {0}")]
    Server(String),

    /// The server replied with an unexpected message for the request
    #[error("Invalid response")]
    InvalidResponse,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Staging file error (parquet/arrow)
    #[error("Staging error: {0}")]
    Staging(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] featstore_protocol::ProtocolError),
}

impl Error {
    /// Create an unsupported-source error
    pub fn unsupported_source(msg: impl Into<String>) -> Self {
        Self::UnsupportedSource(msg.into())
    }

    /// Create a conversion error
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }

    /// Create a row-encoding error
    pub fn row_encoding(row: usize, column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RowEncoding {
            row,
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a staging error
    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    /// True when the error carries partial delivery statistics
    pub fn partial_stats(&self) -> Option<&IngestStats> {
        match self {
            Self::DeliveryTimeout { stats } => Some(stats),
            _ => None,
        }
    }
}

impl From<arrow_schema::ArrowError> for Error {
    fn from(e: arrow_schema::ArrowError) -> Self {
        Error::Staging(e.to_string())
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Error::Staging(e.to_string())
    }
}
