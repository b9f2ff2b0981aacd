//! Feature-set descriptor types
//!
//! A feature set is a named, versioned schema grouping entity and feature
//! columns. The control plane owns these descriptors; clients only ever hold
//! immutable snapshots returned by `GetFeatureSet`/`ApplyFeatureSet`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value types a field can carry, mirrored by [`crate::FieldValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int32,
    Int64,
    Float,
    Double,
    String,
    Bytes,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Bytes => "bytes",
        };
        write!(f, "{}", name)
    }
}

/// A single entity or feature column declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Column name in the source table
    pub name: String,
    /// Declared value type
    pub value_type: ValueType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// Streaming source the feature set ingests through
///
/// Only Kafka-style sources are currently supported for ingestion; a feature
/// set without one cannot accept streamed rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamSource {
    /// Kafka-style broker sink: bootstrap addresses plus target topic
    Kafka {
        /// Comma-separated broker addresses (host:port)
        brokers: String,
        /// Topic encoded rows are published to
        topic: String,
    },
    /// No streaming sink configured (batch-only feature set)
    None,
}

impl StreamSource {
    /// Source type name as reported in errors and logs
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Kafka { .. } => "kafka",
            Self::None => "none",
        }
    }
}

/// Readiness state reported by the control plane
///
/// A feature set accepts ingested rows only once its schema has propagated
/// far enough to reach `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureSetStatus {
    /// Registered but not yet propagated
    Pending,
    /// Schema propagated; ingestion may proceed
    Ready,
    /// Archived or otherwise unavailable
    Invalid,
}

/// Immutable feature-set descriptor snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSetSpec {
    /// Project the feature set belongs to
    pub project: String,
    /// Feature-set name (unique within a project)
    pub name: String,
    /// Version, assigned by the control plane (0 = unassigned)
    pub version: u32,
    /// Entity columns (required, non-null in every ingested row)
    pub entities: Vec<FieldSpec>,
    /// Feature columns
    pub features: Vec<FieldSpec>,
    /// Streaming source configuration
    pub source: StreamSource,
    /// Current readiness state
    pub status: FeatureSetStatus,
}

impl FeatureSetSpec {
    /// Short `project/name:version` reference string
    pub fn reference(&self) -> String {
        format!("{}/{}:{}", self.project, self.name, self.version)
    }

    /// Look up the declared type of an entity column
    pub fn entity_type(&self, name: &str) -> Option<ValueType> {
        self.entities
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value_type)
    }

    /// Look up the declared type of a feature column
    pub fn feature_type(&self, name: &str) -> Option<ValueType> {
        self.features
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value_type)
    }
}

/// Outcome of an `ApplyFeatureSet` upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyStatus {
    /// The descriptor was created or updated
    Created,
    /// The stored descriptor already matched; nothing changed
    NoChange,
}

/// Lifecycle state of a server-side ingestion job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestJobStatus {
    Pending,
    Running,
    Suspended,
    Aborted,
}

/// Metadata about a server-side ingestion job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestJob {
    /// Job identifier
    pub id: String,
    /// `project/name:version` reference of the target feature set
    pub feature_set_ref: String,
    /// Name of the store the job writes to
    pub store_name: String,
    /// Current job state
    pub status: IngestJobStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> FeatureSetSpec {
        FeatureSetSpec {
            project: "fraud".to_string(),
            name: "transactions".to_string(),
            version: 3,
            entities: vec![FieldSpec::new("customer_id", ValueType::Int64)],
            features: vec![
                FieldSpec::new("amount", ValueType::Double),
                FieldSpec::new("merchant", ValueType::String),
            ],
            source: StreamSource::Kafka {
                brokers: "localhost:9092".to_string(),
                topic: "featstore-fraud-transactions".to_string(),
            },
            status: FeatureSetStatus::Ready,
        }
    }

    #[test]
    fn test_reference_format() {
        assert_eq!(sample_spec().reference(), "fraud/transactions:3");
    }

    #[test]
    fn test_field_lookup() {
        let spec = sample_spec();
        assert_eq!(spec.entity_type("customer_id"), Some(ValueType::Int64));
        assert_eq!(spec.feature_type("amount"), Some(ValueType::Double));
        assert_eq!(spec.entity_type("amount"), None);
        assert_eq!(spec.feature_type("missing"), None);
    }

    #[test]
    fn test_source_type_name() {
        assert_eq!(sample_spec().source.type_name(), "kafka");
        assert_eq!(StreamSource::None.type_name(), "none");
    }

    #[test]
    fn test_value_type_display() {
        assert_eq!(ValueType::Int64.to_string(), "int64");
        assert_eq!(ValueType::Double.to_string(), "double");
    }
}
