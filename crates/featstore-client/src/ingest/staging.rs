//! Staging directory lifecycle
//!
//! Every ingestion call stages its input into a temporary directory that must
//! be removed on every exit path. Removal failure is logged, never escalated:
//! it must not mask the error that ended the call.

use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Scoped guard around the temporary staging directory
///
/// The directory is removed when [`StagingDir::cleanup`] is called or when the
/// guard is dropped, whichever comes first.
#[derive(Debug)]
pub struct StagingDir {
    inner: Option<TempDir>,
}

impl StagingDir {
    /// Create a fresh staging directory under the system temp root
    pub fn create() -> Result<Self> {
        let inner = tempfile::Builder::new()
            .prefix("featstore-ingest-")
            .tempdir()
            .map_err(|e| Error::staging(format!("Failed to create staging directory: {}", e)))?;
        debug!(path = %inner.path().display(), "created staging directory");
        Ok(Self { inner: Some(inner) })
    }

    /// Path of the staging directory
    ///
    /// # Panics
    ///
    /// Panics if called after `cleanup`; the guard is consumed by then.
    pub fn path(&self) -> &Path {
        self.inner
            .as_ref()
            .expect("staging directory already cleaned up")
            .path()
    }

    /// Recursively remove the staging directory
    ///
    /// Idempotent; failures are logged at warn and swallowed.
    pub fn cleanup(&mut self) {
        if let Some(dir) = self.inner.take() {
            let path = dir.path().to_path_buf();
            debug!(path = %path.display(), "removing staging directory");
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "failed to remove staging directory");
            }
        }
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        self.cleanup();
    }
}
