//! Streaming ingestion pipeline
//!
//! `ingest` runs in phases: stage the source as a row-group-chunked parquet
//! file, optionally infer and apply the schema, wait for the feature set to
//! become ready, then encode and deliver rows chunk by chunk. One deadline
//! covers readiness waiting and every delivery flush. The staging directory
//! is removed on every exit path, success or failure.

pub mod delivery;
pub mod encoder;
pub mod readiness;
pub mod source;
pub mod staging;

pub use delivery::IngestStats;

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use featstore_protocol::{ApplyStatus, FeatureSetSpec, StreamSource};

use crate::client::Client;
use crate::config::IngestOptions;
use crate::error::{Error, Result};
use crate::feature_set::{infer_fields, FeatureSetRef};
use crate::ingest::source::IngestSource;
use crate::producer::TcpRowProducer;

/// Identifier tying every published row back to its ingestion run
///
/// Deterministic for a given feature set and second of wall time.
pub fn generate_ingestion_id(name: &str, version: u32) -> String {
    let unix_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let seed = format!("{}_{}_{}", name, version, unix_time);
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, seed.as_bytes()).to_string()
}

fn unix_time_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Run the full ingestion pipeline
pub(crate) async fn run(
    client: &mut Client,
    reference: FeatureSetRef,
    source: IngestSource,
    options: IngestOptions,
) -> Result<IngestStats> {
    let started = Instant::now();
    let deadline = started + options.timeout;
    let version = options.version.or(reference.version);

    let chunk_size = options.chunk_size.max(1);
    let max_workers = options.max_workers.max(1);

    let spec = client
        .get_feature_set(&reference.name, version)
        .await?
        .ok_or_else(|| {
            Error::config(format!(
                "Feature set '{}' is not registered in project '{}'",
                reference.name,
                client.project()
            ))
        })?;
    // Fast-fail before any row is read
    sink_target(&spec)?;

    // Phase 1: stage the source off the async runtime
    let mut staged = tokio::task::spawn_blocking(move || {
        source::stage(source, chunk_size, max_workers)
    })
    .await
    .map_err(|e| Error::staging(format!("staging task failed: {}", e)))??;

    // Phase 2: push an inferred schema update before ingesting
    let spec = if options.force_update {
        let inferred = infer_fields(&spec, &staged.schema)?;
        let (applied, status) = client.apply_feature_set(inferred).await?;
        if status == ApplyStatus::Created {
            info!(reference = %applied.reference(), "feature set updated from source schema");
        }
        applied
    } else {
        spec
    };

    // Phase 3: wait for the registry to report readiness
    let project = client.project().to_string();
    let remaining = deadline.saturating_duration_since(Instant::now());
    let spec = readiness::wait_until_ready(
        client,
        &project,
        &spec.name,
        spec.version,
        remaining,
        options.poll_interval,
    )
    .await?;

    let (brokers, topic) = sink_target(&spec)?;
    let ingestion_id = generate_ingestion_id(&spec.name, spec.version);
    info!(
        %ingestion_id,
        reference = %spec.reference(),
        rows = staged.rows,
        chunks = staged.row_groups,
        workers = max_workers,
        "starting ingestion"
    );

    // Phase 4: encode and deliver under the remaining deadline
    let producer =
        TcpRowProducer::connect(&brokers, &topic, crate::config::DEFAULT_CONNECTION_TIMEOUT)
            .await?;
    let mut chunks = encoder::spawn_encoders(
        &staged,
        &spec,
        &ingestion_id,
        unix_time_ms(),
        max_workers,
    );
    let remaining = deadline.saturating_duration_since(Instant::now());
    let result = delivery::deliver(&producer, &mut chunks, &ingestion_id, remaining).await;

    // Phase 5: remove staging before reporting the outcome
    staged.staging.cleanup();
    debug!(%ingestion_id, elapsed = ?started.elapsed(), "ingestion finished");
    result
}

/// Resolve the broker target, rejecting feature sets without a streaming sink
fn sink_target(spec: &FeatureSetSpec) -> Result<(String, String)> {
    match &spec.source {
        StreamSource::Kafka { brokers, topic } => Ok((brokers.clone(), topic.clone())),
        other => Err(Error::UnsupportedSink {
            reference: spec.reference(),
            source_type: other.type_name().to_string(),
        }),
    }
}
