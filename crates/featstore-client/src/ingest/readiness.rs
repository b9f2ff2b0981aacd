//! Readiness gate
//!
//! Ingestion may not publish rows until the target feature set has been
//! provisioned server-side. The gate polls the registry at a fixed interval
//! until the status reads ready or the deadline passes. Polls never overrun
//! the deadline: the final sleep is clamped to the time remaining.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};
use featstore_protocol::{FeatureSetSpec, FeatureSetStatus};

/// Registry lookups the gate depends on
#[async_trait]
pub trait FeatureSetProvider {
    /// Fetch the current spec for `project/name:version`, if registered
    async fn fetch_feature_set(
        &mut self,
        project: &str,
        name: &str,
        version: u32,
    ) -> Result<Option<FeatureSetSpec>>;
}

/// Poll until the feature set is ready, returning its latest spec
pub async fn wait_until_ready<P: FeatureSetProvider + ?Sized>(
    provider: &mut P,
    project: &str,
    name: &str,
    version: u32,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<FeatureSetSpec> {
    let deadline = Instant::now() + timeout;
    let reference = format!("{}/{}:{}", project, name, version);
    loop {
        if let Some(spec) = provider.fetch_feature_set(project, name, version).await? {
            if spec.status == FeatureSetStatus::Ready {
                debug!(%reference, "feature set ready");
                return Ok(spec);
            }
            debug!(%reference, status = ?spec.status, "feature set not ready yet");
        } else {
            debug!(%reference, "feature set not registered yet");
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::ReadinessTimeout { reference });
        }
        tokio::time::sleep(poll_interval.min(remaining)).await;
    }
}
