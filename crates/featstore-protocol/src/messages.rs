//! Protocol message types
//!
//! One request/response pair covers both planes: the control plane (feature
//! set registry, projects, ingestion jobs) and the broker data plane
//! (publish). All messages travel as 4-byte big-endian length-prefixed
//! postcard frames.

use crate::error::{ProtocolError, Result};
use crate::feature_set::{ApplyStatus, FeatureSetSpec, IngestJob};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Filter for `ListFeatureSets`
///
/// Empty strings are treated as `*` wildcards by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSetFilter {
    pub project: String,
    pub name: String,
    pub version: String,
}

/// Filter for `ListIngestJobs`
///
/// `None` fields match everything. The feature-set reference filter is a
/// `project/name:version` string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestJobFilter {
    pub id: Option<String>,
    pub feature_set_ref: Option<String>,
    pub store_name: Option<String>,
}

/// Protocol request messages
///
/// # Stability
///
/// **WARNING**: Variant order must remain stable for postcard serialization
/// compatibility. New variants may only be appended at the end of the enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Liveness / version probe
    Ping,

    /// Fetch a feature set. `version` 0 means latest.
    GetFeatureSet {
        project: String,
        name: String,
        version: u32,
    },

    /// Idempotently register or update a feature set
    ApplyFeatureSet { spec: FeatureSetSpec },

    /// List feature sets matching a filter
    ListFeatureSets { filter: FeatureSetFilter },

    /// Create a project
    CreateProject { name: String },

    /// Archive a project (read-only afterwards, hidden from listings)
    ArchiveProject { name: String },

    /// List active projects
    ListProjects,

    /// List server-side ingestion jobs matching a filter
    ListIngestJobs { filter: IngestJobFilter },

    /// Restart an ingestion job
    RestartIngestJob { id: String },

    /// Stop an ingestion job
    StopIngestJob { id: String },

    /// Publish an encoded row to a broker topic (data plane)
    Publish {
        topic: String,
        key: Option<Bytes>,
        value: Bytes,
    },
}

/// Protocol response messages
///
/// # Stability
///
/// **WARNING**: Variant order must remain stable for postcard serialization
/// compatibility. New variants may only be appended at the end of the enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Liveness reply carrying the server version string
    Pong { version: String },

    /// Feature set lookup result (`None` when nothing matched)
    FeatureSet { spec: Option<FeatureSetSpec> },

    /// Apply outcome: the stored descriptor plus whether anything changed
    Applied {
        spec: FeatureSetSpec,
        status: ApplyStatus,
    },

    /// Feature sets matching a list filter
    FeatureSets { specs: Vec<FeatureSetSpec> },

    /// Project created
    ProjectCreated,

    /// Project archived
    ProjectArchived,

    /// Active project names
    Projects { names: Vec<String> },

    /// Ingestion jobs matching a list filter
    IngestJobs { jobs: Vec<IngestJob> },

    /// Ingestion job restarted
    JobRestarted,

    /// Ingestion job stopped
    JobStopped,

    /// Row accepted by the broker
    Published { offset: u64 },

    /// Server-side failure with the server-provided detail message
    Error { message: String },
}

impl Request {
    /// Serialize request to bytes (postcard, no length prefix)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize request from bytes (postcard)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        postcard::from_bytes(data).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

impl Response {
    /// Serialize response to bytes (postcard, no length prefix)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize response from bytes (postcard)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        postcard::from_bytes(data).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_set::{FeatureSetStatus, FieldSpec, StreamSource, ValueType};

    fn sample_spec() -> FeatureSetSpec {
        FeatureSetSpec {
            project: "default".to_string(),
            name: "driver_stats".to_string(),
            version: 1,
            entities: vec![FieldSpec::new("driver_id", ValueType::Int64)],
            features: vec![FieldSpec::new("trips_today", ValueType::Int32)],
            source: StreamSource::Kafka {
                brokers: "localhost:9092".to_string(),
                topic: "featstore-default-driver_stats".to_string(),
            },
            status: FeatureSetStatus::Pending,
        }
    }

    #[test]
    fn test_request_roundtrip() {
        let request = Request::GetFeatureSet {
            project: "default".to_string(),
            name: "driver_stats".to_string(),
            version: 0,
        };
        let bytes = request.to_bytes().unwrap();
        let back = Request::from_bytes(&bytes).unwrap();
        match back {
            Request::GetFeatureSet {
                project,
                name,
                version,
            } => {
                assert_eq!(project, "default");
                assert_eq!(name, "driver_stats");
                assert_eq!(version, 0);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_apply_roundtrip_preserves_spec() {
        let request = Request::ApplyFeatureSet {
            spec: sample_spec(),
        };
        let bytes = request.to_bytes().unwrap();
        match Request::from_bytes(&bytes).unwrap() {
            Request::ApplyFeatureSet { spec } => assert_eq!(spec, sample_spec()),
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_publish_roundtrip() {
        let request = Request::Publish {
            topic: "t".to_string(),
            key: None,
            value: Bytes::from_static(b"payload"),
        };
        let bytes = request.to_bytes().unwrap();
        match Request::from_bytes(&bytes).unwrap() {
            Request::Publish { topic, key, value } => {
                assert_eq!(topic, "t");
                assert!(key.is_none());
                assert_eq!(&value[..], b"payload");
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_response_roundtrip() {
        let response = Response::Applied {
            spec: sample_spec(),
            status: ApplyStatus::NoChange,
        };
        let bytes = response.to_bytes().unwrap();
        match Response::from_bytes(&bytes).unwrap() {
            Response::Applied { status, .. } => assert_eq!(status, ApplyStatus::NoChange),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_truncated_response_is_a_deserialization_error() {
        let bytes = Response::Pong {
            version: "0.3.1".to_string(),
        }
        .to_bytes()
        .unwrap();
        let err = Response::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn test_ingest_job_filter_default_matches_everything() {
        let filter = IngestJobFilter::default();
        assert!(filter.id.is_none());
        assert!(filter.feature_set_ref.is_none());
        assert!(filter.store_name.is_none());
    }
}
