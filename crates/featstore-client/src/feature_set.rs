//! Client-side feature-set helpers
//!
//! [`FeatureSetRef`] names an ingestion target (`"name"` or `"name:version"`),
//! and [`infer_fields`] rebuilds a descriptor's feature columns from a staged
//! table's arrow schema for `force_update` ingestion.

use arrow_schema::{DataType, Schema};
use featstore_protocol::{FeatureSetSpec, FieldSpec, ValueType};

use crate::error::{Error, Result};
use crate::ingest::source::EVENT_TIMESTAMP_COLUMN;

/// Reference to a feature set by name and optional version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSetRef {
    pub name: String,
    pub version: Option<u32>,
}

impl FeatureSetRef {
    pub fn new(name: impl Into<String>, version: Option<u32>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Parse `"name"` or `"name:version"`
    pub fn parse(reference: &str) -> Result<Self> {
        match reference.split_once(':') {
            None => Ok(Self::new(reference.trim(), None)),
            Some((name, version)) => {
                let version = version.parse::<u32>().map_err(|_| {
                    Error::config(format!(
                        "Invalid feature set reference '{}': version must be an integer",
                        reference
                    ))
                })?;
                Ok(Self::new(name.trim(), Some(version)))
            }
        }
    }
}

impl From<&str> for FeatureSetRef {
    fn from(reference: &str) -> Self {
        // Fallible parsing is available via `parse`; the infallible conversion
        // treats a malformed version suffix as part of the name.
        Self::parse(reference).unwrap_or_else(|_| Self::new(reference, None))
    }
}

impl From<&FeatureSetSpec> for FeatureSetRef {
    fn from(spec: &FeatureSetSpec) -> Self {
        Self::new(spec.name.clone(), Some(spec.version))
    }
}

/// Map an arrow type to the wire value type, when one exists
pub(crate) fn arrow_value_type(data_type: &DataType) -> Option<ValueType> {
    match data_type {
        DataType::Boolean => Some(ValueType::Bool),
        DataType::Int8 | DataType::Int16 | DataType::Int32 => Some(ValueType::Int32),
        DataType::Int64 => Some(ValueType::Int64),
        DataType::Float32 => Some(ValueType::Float),
        DataType::Float64 => Some(ValueType::Double),
        DataType::Utf8 | DataType::LargeUtf8 => Some(ValueType::String),
        DataType::Binary | DataType::LargeBinary => Some(ValueType::Bytes),
        _ => None,
    }
}

/// Rebuild a descriptor's feature columns from a staged table's schema
///
/// Declared entity columns are kept and must be present in the sample with a
/// compatible type; every other mappable column (except the event-timestamp
/// column) becomes a feature. Returns a fresh snapshot; the input is not
/// mutated.
pub fn infer_fields(spec: &FeatureSetSpec, schema: &Schema) -> Result<FeatureSetSpec> {
    let mut inferred = spec.clone();

    for entity in &spec.entities {
        let field = schema.field_with_name(&entity.name).map_err(|_| {
            Error::conversion(format!(
                "Entity column '{}' missing from source schema",
                entity.name
            ))
        })?;
        match arrow_value_type(field.data_type()) {
            Some(vt) if vt == entity.value_type => {}
            Some(vt) => {
                return Err(Error::conversion(format!(
                    "Entity column '{}' has type {} but the feature set declares {}",
                    entity.name, vt, entity.value_type
                )))
            }
            None => {
                return Err(Error::conversion(format!(
                    "Entity column '{}' has an unsupported source type {:?}",
                    entity.name,
                    field.data_type()
                )))
            }
        }
    }

    let mut features = Vec::new();
    for field in schema.fields() {
        let name = field.name();
        if name == EVENT_TIMESTAMP_COLUMN || spec.entity_type(name).is_some() {
            continue;
        }
        if let Some(value_type) = arrow_value_type(field.data_type()) {
            features.push(FieldSpec::new(name.clone(), value_type));
        } else {
            tracing::debug!(
                column = %name,
                data_type = ?field.data_type(),
                "skipping column with unsupported type during field inference"
            );
        }
    }
    inferred.features = features;

    Ok(inferred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::Field;
    use featstore_protocol::{FeatureSetStatus, StreamSource};

    fn sample_spec() -> FeatureSetSpec {
        FeatureSetSpec {
            project: "default".to_string(),
            name: "driver_stats".to_string(),
            version: 1,
            entities: vec![FieldSpec::new("driver_id", ValueType::Int64)],
            features: vec![FieldSpec::new("stale_feature", ValueType::Bool)],
            source: StreamSource::Kafka {
                brokers: "localhost:9092".to_string(),
                topic: "t".to_string(),
            },
            status: FeatureSetStatus::Pending,
        }
    }

    #[test]
    fn test_parse_name_only() {
        let r = FeatureSetRef::parse("driver_stats").unwrap();
        assert_eq!(r.name, "driver_stats");
        assert_eq!(r.version, None);
    }

    #[test]
    fn test_parse_name_and_version() {
        let r = FeatureSetRef::parse("driver_stats:4").unwrap();
        assert_eq!(r.name, "driver_stats");
        assert_eq!(r.version, Some(4));
    }

    #[test]
    fn test_parse_rejects_bad_version() {
        assert!(FeatureSetRef::parse("driver_stats:latest").is_err());
    }

    #[test]
    fn test_infer_replaces_features_and_keeps_entities() {
        let schema = Schema::new(vec![
            Field::new("driver_id", DataType::Int64, false),
            Field::new("trips_today", DataType::Int32, true),
            Field::new("rating", DataType::Float64, true),
            Field::new(EVENT_TIMESTAMP_COLUMN, DataType::Int64, true),
        ]);
        let inferred = infer_fields(&sample_spec(), &schema).unwrap();

        assert_eq!(inferred.entities, sample_spec().entities);
        let names: Vec<&str> = inferred.features.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["trips_today", "rating"]);
        assert_eq!(inferred.feature_type("trips_today"), Some(ValueType::Int32));
        assert_eq!(inferred.feature_type("rating"), Some(ValueType::Double));
        // The stale declared feature is gone
        assert_eq!(inferred.feature_type("stale_feature"), None);
    }

    #[test]
    fn test_infer_requires_entity_column() {
        let schema = Schema::new(vec![Field::new("rating", DataType::Float64, true)]);
        let err = infer_fields(&sample_spec(), &schema).unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
    }

    #[test]
    fn test_infer_rejects_entity_type_mismatch() {
        let schema = Schema::new(vec![Field::new("driver_id", DataType::Utf8, false)]);
        assert!(infer_fields(&sample_spec(), &schema).is_err());
    }
}
