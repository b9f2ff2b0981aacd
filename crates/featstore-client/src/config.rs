//! Client and ingestion configuration
//!
//! Defaults are resolved at call time, never stored as process-wide state:
//! in particular the worker-count default reads the host CPU count when an
//! `IngestOptions` value is constructed.

use std::time::Duration;

/// Default amount of rows loaded and ingested at a time
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Default overall ingestion deadline
pub const DEFAULT_INGEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Interval between readiness polls against the control plane
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default control-plane connection timeout
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Worker-count default: host CPUs minus one, at least one
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Control-plane client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Control-plane address (host:port)
    pub core_url: String,
    /// Active project; feature sets are resolved within it
    pub project: String,
    /// Channel-establishment timeout
    pub connection_timeout: Duration,
}

impl ClientConfig {
    /// Create a config for the given control-plane address
    pub fn new(core_url: impl Into<String>) -> Self {
        Self {
            core_url: core_url.into(),
            project: "default".to_string(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    /// Set the active project
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Set the connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// Per-call ingestion options
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Maximum rows per row group (and per delivered chunk)
    pub chunk_size: usize,
    /// Target feature-set version; `None` resolves to the latest
    pub version: Option<u32>,
    /// Infer fields from the staged data and apply the update before polling
    pub force_update: bool,
    /// Encoding worker-pool size, clamped to at least 1
    pub max_workers: usize,
    /// Overall deadline covering readiness waiting and delivery flushes
    pub timeout: Duration,
    /// Interval between readiness polls
    pub poll_interval: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            version: None,
            force_update: false,
            max_workers: default_max_workers(),
            timeout: DEFAULT_INGEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl IngestOptions {
    /// Set the chunk size
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Pin the target feature-set version
    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Enable schema inference + apply before ingesting
    pub fn force_update(mut self, force_update: bool) -> Self {
        self.force_update = force_update;
        self
    }

    /// Set the worker-pool size
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the overall deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the readiness poll interval
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_workers_at_least_one() {
        assert!(default_max_workers() >= 1);
    }

    #[test]
    fn test_ingest_options_defaults() {
        let opts = IngestOptions::default();
        assert_eq!(opts.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(opts.version.is_none());
        assert!(!opts.force_update);
        assert!(opts.max_workers >= 1);
        assert_eq!(opts.timeout, DEFAULT_INGEST_TIMEOUT);
    }

    #[test]
    fn test_builder_style_options() {
        let opts = IngestOptions::default()
            .chunk_size(5)
            .version(2)
            .force_update(true)
            .max_workers(2)
            .timeout(Duration::from_secs(30));
        assert_eq!(opts.chunk_size, 5);
        assert_eq!(opts.version, Some(2));
        assert!(opts.force_update);
        assert_eq!(opts.max_workers, 2);
        assert_eq!(opts.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_client_config() {
        let config = ClientConfig::new("localhost:6565")
            .project("fraud")
            .connection_timeout(Duration::from_secs(3));
        assert_eq!(config.core_url, "localhost:6565");
        assert_eq!(config.project, "fraud");
        assert_eq!(config.connection_timeout, Duration::from_secs(3));
    }
}
