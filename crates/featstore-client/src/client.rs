//! Control-plane client
//!
//! [`Client`] speaks the length-prefixed postcard protocol to the registry:
//! feature sets, projects, and server-side ingestion jobs. One request is in
//! flight at a time; [`Client::ingest`] layers the streaming pipeline on top
//! and opens its own broker connection for the data plane.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpStream,
};
use tracing::{debug, info};

use featstore_protocol::{
    check_message_size, ApplyStatus, FeatureSetFilter, FeatureSetSpec, FieldSpec, IngestJob,
    IngestJobFilter, Request, Response,
};

use crate::config::{ClientConfig, IngestOptions};
use crate::error::{Error, Result};
use crate::feature_set::FeatureSetRef;
use crate::ingest::delivery::IngestStats;
use crate::ingest::readiness::FeatureSetProvider;
use crate::ingest::source::IngestSource;

/// Control-plane client
///
/// # Example
///
/// ```rust,ignore
/// use featstore_client::{Client, ClientConfig, IngestOptions};
///
/// # async fn example() -> featstore_client::Result<()> {
/// let mut client = Client::connect(ClientConfig::new("localhost:6565")).await?;
/// let stats = client
///     .ingest("driver_stats", std::path::Path::new("rows.parquet"), IngestOptions::default())
///     .await?;
/// println!("{}", stats);
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl Client {
    /// Connect to the control plane
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let stream = tokio::time::timeout(
            config.connection_timeout,
            TcpStream::connect(&config.core_url),
        )
        .await
        .map_err(|_| Error::connection(format!("Connection timeout to {}", config.core_url)))?
        .map_err(|e| Error::connection(format!("{}: {}", config.core_url, e)))?;
        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        info!(core_url = %config.core_url, project = %config.project, "connected to control plane");
        Ok(Self {
            config,
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }

    /// Active project
    pub fn project(&self) -> &str {
        &self.config.project
    }

    /// Switch the active project
    pub fn set_project(&mut self, project: impl Into<String>) {
        self.config.project = project.into();
    }

    /// Send one request and read its response
    ///
    /// Server-reported failures come back as [`Error::Server`]; callers only
    /// match success variants.
    async fn send_request(&mut self, request: Request) -> Result<Response> {
        let bytes = request.to_bytes()?;
        check_message_size(bytes.len())?;
        self.writer
            .write_all(&(bytes.len() as u32).to_be_bytes())
            .await?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;
        check_message_size(len)?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await?;

        match Response::from_bytes(&buf)? {
            Response::Error { message } => Err(Error::Server(message)),
            response => Ok(response),
        }
    }

    /// Liveness probe; returns the server version string
    pub async fn ping(&mut self) -> Result<String> {
        match self.send_request(Request::Ping).await? {
            Response::Pong { version } => Ok(version),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Fetch a feature set from the active project; `None` version = latest
    pub async fn get_feature_set(
        &mut self,
        name: &str,
        version: Option<u32>,
    ) -> Result<Option<FeatureSetSpec>> {
        let request = Request::GetFeatureSet {
            project: self.config.project.clone(),
            name: name.to_string(),
            version: version.unwrap_or(0),
        };
        match self.send_request(request).await? {
            Response::FeatureSet { spec } => Ok(spec),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Idempotently register or update a feature set
    ///
    /// The project is forced to the client's active project. Returns the
    /// stored snapshot (with its server-assigned version) and whether
    /// anything changed.
    pub async fn apply_feature_set(
        &mut self,
        mut spec: FeatureSetSpec,
    ) -> Result<(FeatureSetSpec, ApplyStatus)> {
        spec.project = self.config.project.clone();
        match self.send_request(Request::ApplyFeatureSet { spec }).await? {
            Response::Applied { spec, status } => {
                debug!(reference = %spec.reference(), ?status, "feature set applied");
                Ok((spec, status))
            }
            _ => Err(Error::InvalidResponse),
        }
    }

    /// List feature sets; empty filter fields are wildcards
    ///
    /// An empty project filter defaults to the active project.
    pub async fn list_feature_sets(
        &mut self,
        mut filter: FeatureSetFilter,
    ) -> Result<Vec<FeatureSetSpec>> {
        if filter.project.is_empty() {
            filter.project = self.config.project.clone();
        }
        match self.send_request(Request::ListFeatureSets { filter }).await? {
            Response::FeatureSets { specs } => Ok(specs),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// List entity columns aggregated across the active project's feature sets
    ///
    /// Entities sharing a name collapse to one entry; the ordering is by
    /// entity name.
    pub async fn list_entities(&mut self) -> Result<Vec<FieldSpec>> {
        let specs = self.list_feature_sets(FeatureSetFilter::default()).await?;
        let mut by_name = std::collections::BTreeMap::new();
        for spec in specs {
            for entity in spec.entities {
                by_name.insert(entity.name.clone(), entity);
            }
        }
        Ok(by_name.into_values().collect())
    }

    /// Create a project
    pub async fn create_project(&mut self, name: &str) -> Result<()> {
        let request = Request::CreateProject {
            name: name.to_string(),
        };
        match self.send_request(request).await? {
            Response::ProjectCreated => Ok(()),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Archive a project
    ///
    /// Archiving the active project resets the client back to `default`.
    pub async fn archive_project(&mut self, name: &str) -> Result<()> {
        let request = Request::ArchiveProject {
            name: name.to_string(),
        };
        match self.send_request(request).await? {
            Response::ProjectArchived => {
                if self.config.project == name {
                    self.config.project = "default".to_string();
                }
                Ok(())
            }
            _ => Err(Error::InvalidResponse),
        }
    }

    /// List active projects
    pub async fn list_projects(&mut self) -> Result<Vec<String>> {
        match self.send_request(Request::ListProjects).await? {
            Response::Projects { names } => Ok(names),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// List server-side ingestion jobs matching the filter
    pub async fn list_ingest_jobs(&mut self, filter: IngestJobFilter) -> Result<Vec<IngestJob>> {
        match self.send_request(Request::ListIngestJobs { filter }).await? {
            Response::IngestJobs { jobs } => Ok(jobs),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Restart a server-side ingestion job
    pub async fn restart_ingest_job(&mut self, id: &str) -> Result<()> {
        let request = Request::RestartIngestJob { id: id.to_string() };
        match self.send_request(request).await? {
            Response::JobRestarted => Ok(()),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Stop a server-side ingestion job
    pub async fn stop_ingest_job(&mut self, id: &str) -> Result<()> {
        let request = Request::StopIngestJob { id: id.to_string() };
        match self.send_request(request).await? {
            Response::JobStopped => Ok(()),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Stream a source into a feature set's broker topic
    ///
    /// Stages the source as parquet, optionally infers and applies the schema
    /// (`force_update`), waits for readiness, then encodes and delivers every
    /// row. Returns the run's statistics; the staging directory is removed on
    /// every exit path.
    pub async fn ingest(
        &mut self,
        feature_set: impl Into<FeatureSetRef>,
        source: impl Into<IngestSource>,
        options: IngestOptions,
    ) -> Result<IngestStats> {
        crate::ingest::run(self, feature_set.into(), source.into(), options).await
    }
}

#[async_trait]
impl FeatureSetProvider for Client {
    async fn fetch_feature_set(
        &mut self,
        project: &str,
        name: &str,
        version: u32,
    ) -> Result<Option<FeatureSetSpec>> {
        let request = Request::GetFeatureSet {
            project: project.to_string(),
            name: name.to_string(),
            version,
        };
        match self.send_request(request).await? {
            Response::FeatureSet { spec } => Ok(spec),
            _ => Err(Error::InvalidResponse),
        }
    }
}
