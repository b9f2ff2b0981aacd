//! Featstore Wire Protocol
//!
//! This crate defines the wire protocol types shared between the featstore
//! SDK, the control plane (feature-set registry), and the streaming broker.
//! It provides serialization/deserialization for all protocol messages and
//! for the encoded feature row that ingestion publishes to broker topics.
//!
//! # Protocol Stability
//!
//! The enum variant order is significant for postcard serialization. Changes
//! to variant order will break wire compatibility with existing clients and
//! servers; new variants must only be appended.
//!
//! # Example
//!
//! ```rust,ignore
//! use featstore_protocol::{Request, Response};
//!
//! // Serialize a request
//! let request = Request::Ping;
//! let bytes = request.to_bytes()?;
//!
//! // Deserialize a response
//! let response = Response::from_bytes(&bytes)?;
//! ```

mod error;
mod feature_set;
mod messages;
mod row;

pub use error::{ProtocolError, Result};
pub use feature_set::{
    ApplyStatus, FeatureSetSpec, FeatureSetStatus, FieldSpec, IngestJob, IngestJobStatus,
    StreamSource, ValueType,
};
pub use messages::{FeatureSetFilter, IngestJobFilter, Request, Response};
pub use row::{FeatureRow, FieldValue};

/// Maximum message size (64 MiB)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Validate a frame length against [`MAX_MESSAGE_SIZE`]
pub fn check_message_size(len: usize) -> Result<()> {
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
    }
    Ok(())
}
