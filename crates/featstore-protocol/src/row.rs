//! Encoded feature row
//!
//! [`FeatureRow`] is the record ingestion publishes to broker topics: entity
//! values, feature values, an event timestamp, and the ingestion id that ties
//! the row back to the run that produced it. Rows are postcard-encoded; the
//! field and variant order is part of the wire format.

use crate::error::{ProtocolError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A typed field value, mirroring [`crate::ValueType`]
///
/// # Stability
///
/// Variant order must remain stable for postcard serialization compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Bytes),
}

impl FieldValue {
    /// The [`crate::ValueType`] this value inhabits
    pub fn value_type(&self) -> crate::ValueType {
        match self {
            Self::Bool(_) => crate::ValueType::Bool,
            Self::Int32(_) => crate::ValueType::Int32,
            Self::Int64(_) => crate::ValueType::Int64,
            Self::Float(_) => crate::ValueType::Float,
            Self::Double(_) => crate::ValueType::Double,
            Self::String(_) => crate::ValueType::String,
            Self::Bytes(_) => crate::ValueType::Bytes,
        }
    }
}

/// One encoded row bound for a broker topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Identifier of the ingestion run that produced this row
    pub ingestion_id: String,
    /// Event timestamp, milliseconds since the Unix epoch
    pub event_timestamp_ms: i64,
    /// Entity column values in declaration order
    pub entities: Vec<(String, FieldValue)>,
    /// Feature column values in declaration order
    pub fields: Vec<(String, FieldValue)>,
}

impl FeatureRow {
    /// Serialize to wire bytes (postcard)
    pub fn to_bytes(&self) -> Result<Bytes> {
        postcard::to_allocvec(self)
            .map(Bytes::from)
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from wire bytes (postcard)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        postcard::from_bytes(data).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}
