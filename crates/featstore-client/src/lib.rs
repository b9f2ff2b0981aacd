//! Feature-store client SDK
//!
//! Talks to the control plane (feature-set registry, projects, ingestion
//! jobs) and streams tabular data into feature-set broker topics. The
//! ingestion pipeline stages sources as parquet, encodes rows on a worker
//! pool, and delivers them chunk by chunk with per-chunk flushes under one
//! overall deadline.
//!
//! # Example
//!
//! ```rust,ignore
//! use featstore_client::{Client, ClientConfig, IngestOptions};
//!
//! # async fn example() -> featstore_client::Result<()> {
//! let mut client = Client::connect(ClientConfig::new("localhost:6565")).await?;
//! let stats = client
//!     .ingest(
//!         "driver_stats",
//!         std::path::Path::new("driver_stats.parquet"),
//!         IngestOptions::default().force_update(true),
//!     )
//!     .await?;
//! println!("{}", stats);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod feature_set;
pub mod ingest;
pub mod producer;

pub use client::Client;
pub use config::{ClientConfig, IngestOptions, DEFAULT_CHUNK_SIZE, DEFAULT_INGEST_TIMEOUT};
pub use error::{Error, Result};
pub use feature_set::{infer_fields, FeatureSetRef};
pub use ingest::source::IngestSource;
pub use ingest::IngestStats;
pub use producer::{RowSink, SinkStats, TcpRowProducer};

// Wire types shared with the control plane and broker
pub use featstore_protocol::{
    ApplyStatus, FeatureRow, FeatureSetFilter, FeatureSetSpec, FeatureSetStatus, FieldSpec,
    FieldValue, IngestJob, IngestJobFilter, IngestJobStatus, StreamSource, ValueType,
};
