//! Delivery coordinator
//!
//! Drains the ordered chunk stream into a [`RowSink`], flushing once per
//! chunk so at most one chunk of rows is unacknowledged at any time. The
//! coordinator owns the run's statistics; workers and the sink only report
//! through their channels and counters. The ingest deadline spans the whole
//! delivery phase: each flush gets whatever time remains.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ingest::encoder::ChunkStream;
use crate::producer::RowSink;

/// Statistics for one ingestion run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestStats {
    /// Identifier of the run
    pub ingestion_id: String,
    /// Rows read from the staged source and submitted
    pub rows_attempted: u64,
    /// Rows acknowledged by the sink
    pub rows_delivered: u64,
    /// Rows rejected or lost
    pub rows_failed: u64,
    /// Chunks flushed
    pub chunks: u64,
    /// Wall time of the delivery phase
    pub elapsed: Duration,
}

impl IngestStats {
    /// Delivered rows per second of delivery wall time
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.rows_delivered as f64 / secs
        }
    }
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ingestion {}: attempted={} delivered={} failed={} chunks={} elapsed={:.2}s rate={:.0} rows/s",
            self.ingestion_id,
            self.rows_attempted,
            self.rows_delivered,
            self.rows_failed,
            self.chunks,
            self.elapsed.as_secs_f64(),
            self.rate()
        )
    }
}

/// Drain the chunk stream into the sink, flushing after every chunk
pub async fn deliver(
    sink: &dyn RowSink,
    stream: &mut ChunkStream,
    ingestion_id: &str,
    timeout: Duration,
) -> Result<IngestStats> {
    let started = Instant::now();
    let deadline = started + timeout;

    let mut attempted: u64 = 0;
    let mut chunks: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let rows = chunk.rows.len();
        for value in chunk.rows {
            sink.submit(value).await?;
        }
        attempted += rows as u64;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let drained = sink.flush(remaining).await?;
        chunks += 1;
        if !drained {
            let stats = snapshot(sink, ingestion_id, attempted, chunks, started);
            return Err(Error::DeliveryTimeout { stats });
        }
        debug!(
            ingestion_id,
            chunk = chunk.index,
            rows,
            "chunk delivered"
        );
    }

    let stats = snapshot(sink, ingestion_id, attempted, chunks, started);
    info!(%stats, "delivery complete");
    Ok(stats)
}

fn snapshot(
    sink: &dyn RowSink,
    ingestion_id: &str,
    attempted: u64,
    chunks: u64,
    started: Instant,
) -> IngestStats {
    let sink_stats = sink.stats();
    IngestStats {
        ingestion_id: ingestion_id.to_string(),
        rows_attempted: attempted,
        rows_delivered: sink_stats.delivered,
        rows_failed: sink_stats.failed,
        chunks,
        elapsed: started.elapsed(),
    }
}
