//! Row encoder pool
//!
//! A pool of blocking workers that each claim row groups from the staging
//! parquet file, encode every row into a wire-ready [`FeatureRow`], and hand
//! the finished chunks to the consumer over a bounded channel. Workers claim
//! groups from a shared atomic counter, so a slow group never idles the rest
//! of the pool. [`ChunkStream`] reorders completed chunks so the consumer
//! always sees them in row-group order.

use std::collections::BTreeMap;
use std::fs::File;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow_array::{
    Array, BinaryArray, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array,
    Int64Array, Int8Array, LargeBinaryArray, LargeStringArray, RecordBatch, StringArray,
    TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
    TimestampSecondArray,
};
use arrow_schema::{DataType, TimeUnit};
use bytes::Bytes;
use featstore_protocol::{FeatureRow, FeatureSetSpec, FieldValue};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::ingest::source::{StagedTable, EVENT_TIMESTAMP_COLUMN};

/// In-flight chunk budget per worker on the completion channel
const CHANNEL_DEPTH_PER_WORKER: usize = 2;

/// One fully encoded row group
#[derive(Debug)]
pub struct EncodedChunk {
    /// Row-group index in the staging file
    pub index: usize,
    /// Wire-encoded rows, in source order
    pub rows: Vec<Bytes>,
}

/// Parameters shared by every encoder worker
struct EncodeContext {
    path: std::path::PathBuf,
    spec: FeatureSetSpec,
    ingestion_id: String,
    default_timestamp_ms: i64,
    row_group_size: usize,
}

/// Spawn the worker pool over a staged table and return the ordered stream
pub fn spawn_encoders(
    staged: &StagedTable,
    spec: &FeatureSetSpec,
    ingestion_id: &str,
    default_timestamp_ms: i64,
    max_workers: usize,
) -> ChunkStream {
    let total = staged.row_groups;
    let workers = max_workers.max(1).min(total.max(1));
    let (tx, rx) = mpsc::channel(workers * CHANNEL_DEPTH_PER_WORKER);
    let next_group = Arc::new(AtomicUsize::new(0));
    let ctx = Arc::new(EncodeContext {
        path: staged.path.clone(),
        spec: spec.clone(),
        ingestion_id: ingestion_id.to_string(),
        default_timestamp_ms,
        row_group_size: staged.row_group_size,
    });

    debug!(workers, row_groups = total, "starting encoder pool");
    for worker in 0..workers {
        let tx = tx.clone();
        let next_group = next_group.clone();
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || {
            loop {
                let group = next_group.fetch_add(1, Ordering::Relaxed);
                if group >= total {
                    break;
                }
                trace!(worker, group, "encoding row group");
                let result = encode_group(&ctx, group);
                let failed = result.is_err();
                if tx.blocking_send((group, result)).is_err() || failed {
                    // Consumer gone or this worker hit a hard error
                    break;
                }
            }
        });
    }

    ChunkStream {
        rx,
        buffered: BTreeMap::new(),
        next: 0,
        total,
    }
}

/// Ordered view over the pool's completed chunks
///
/// Workers finish groups in whatever order the scheduler allows; the stream
/// buffers early arrivals and yields strictly ascending row-group indexes.
pub struct ChunkStream {
    rx: mpsc::Receiver<(usize, Result<EncodedChunk>)>,
    buffered: BTreeMap<usize, Result<EncodedChunk>>,
    next: usize,
    total: usize,
}

impl ChunkStream {
    /// Total row groups this stream will yield
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Next chunk in row-group order, or `None` when all groups are consumed
    pub async fn next(&mut self) -> Option<Result<EncodedChunk>> {
        while self.next < self.total {
            if let Some(entry) = self.buffered.remove(&self.next) {
                self.next += 1;
                return Some(entry);
            }
            match self.rx.recv().await {
                Some((index, chunk)) => {
                    self.buffered.insert(index, chunk);
                }
                None => {
                    // Workers exited early; surface the first buffered error.
                    // Buffered successes above `next` are dropped so the
                    // ascending-order guarantee holds on the final yield.
                    self.next = self.total;
                    let failed = self
                        .buffered
                        .iter()
                        .find(|(_, entry)| entry.is_err())
                        .map(|(index, _)| *index);
                    return match failed.and_then(|index| self.buffered.remove(&index)) {
                        Some(entry) => Some(entry),
                        None => Some(Err(Error::staging(
                            "Encoder workers exited before all row groups were produced",
                        ))),
                    };
                }
            }
        }
        None
    }
}

/// Read one row group from the staging file and encode all of its rows
fn encode_group(ctx: &EncodeContext, group: usize) -> Result<EncodedChunk> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&ctx.path)?)?
        .with_row_groups(vec![group])
        .with_batch_size(ctx.row_group_size)
        .build()?;

    let base_row = group * ctx.row_group_size;
    let mut rows = Vec::with_capacity(ctx.row_group_size);
    let mut offset = 0;
    for batch in reader {
        let batch = batch?;
        encode_batch(ctx, &batch, base_row + offset, &mut rows)?;
        offset += batch.num_rows();
    }
    Ok(EncodedChunk { index: group, rows })
}

/// Encode every row of one record batch
fn encode_batch(
    ctx: &EncodeContext,
    batch: &RecordBatch,
    base_row: usize,
    out: &mut Vec<Bytes>,
) -> Result<()> {
    let schema = batch.schema();
    let timestamp_column = schema
        .index_of(EVENT_TIMESTAMP_COLUMN)
        .ok()
        .map(|i| batch.column(i).as_ref());

    // Resolve entity and feature columns once per batch
    let mut entity_columns = Vec::with_capacity(ctx.spec.entities.len());
    for entity in &ctx.spec.entities {
        let index = schema.index_of(&entity.name).map_err(|_| {
            Error::row_encoding(base_row, &entity.name, "entity column missing from source")
        })?;
        entity_columns.push((
            entity.name.as_str(),
            entity.value_type,
            batch.column(index).as_ref(),
        ));
    }
    let mut feature_columns = Vec::with_capacity(ctx.spec.features.len());
    for feature in &ctx.spec.features {
        if let Ok(index) = schema.index_of(&feature.name) {
            feature_columns.push((
                feature.name.as_str(),
                feature.value_type,
                batch.column(index).as_ref(),
            ));
        }
    }

    for row in 0..batch.num_rows() {
        let absolute = base_row + row;

        let mut entities = Vec::with_capacity(entity_columns.len());
        for (name, declared, column) in &entity_columns {
            match field_value(*column, row) {
                Ok(Some(value)) if value.value_type() == *declared => {
                    entities.push((name.to_string(), value))
                }
                Ok(Some(value)) => {
                    return Err(Error::row_encoding(
                        absolute,
                        *name,
                        format!("value type {} does not match declared {}", value.value_type(), declared),
                    ))
                }
                Ok(None) => {
                    return Err(Error::row_encoding(absolute, *name, "null entity value"))
                }
                Err(msg) => return Err(Error::row_encoding(absolute, *name, msg)),
            }
        }

        // Null feature values are omitted from the encoded row
        let mut fields = Vec::with_capacity(feature_columns.len());
        for (name, declared, column) in &feature_columns {
            match field_value(*column, row) {
                Ok(Some(value)) if value.value_type() == *declared => {
                    fields.push((name.to_string(), value))
                }
                Ok(Some(value)) => {
                    return Err(Error::row_encoding(
                        absolute,
                        *name,
                        format!("value type {} does not match declared {}", value.value_type(), declared),
                    ))
                }
                Ok(None) => {}
                Err(msg) => return Err(Error::row_encoding(absolute, *name, msg)),
            }
        }

        let event_timestamp_ms = match timestamp_column {
            Some(column) => timestamp_ms(column, row)
                .map_err(|msg| Error::row_encoding(absolute, EVENT_TIMESTAMP_COLUMN, msg))?
                .unwrap_or(ctx.default_timestamp_ms),
            None => ctx.default_timestamp_ms,
        };

        let feature_row = FeatureRow {
            ingestion_id: ctx.ingestion_id.clone(),
            event_timestamp_ms,
            entities,
            fields,
        };
        out.push(feature_row.to_bytes()?);
    }
    Ok(())
}

/// Extract one cell as a [`FieldValue`]; `Ok(None)` means null
fn field_value(
    array: &dyn Array,
    row: usize,
) -> std::result::Result<Option<FieldValue>, String> {
    if array.is_null(row) {
        return Ok(None);
    }
    let value = match array.data_type() {
        DataType::Boolean => {
            FieldValue::Bool(downcast::<BooleanArray>(array)?.value(row))
        }
        DataType::Int8 => FieldValue::Int32(downcast::<Int8Array>(array)?.value(row) as i32),
        DataType::Int16 => FieldValue::Int32(downcast::<Int16Array>(array)?.value(row) as i32),
        DataType::Int32 => FieldValue::Int32(downcast::<Int32Array>(array)?.value(row)),
        DataType::Int64 => FieldValue::Int64(downcast::<Int64Array>(array)?.value(row)),
        DataType::Float32 => FieldValue::Float(downcast::<Float32Array>(array)?.value(row)),
        DataType::Float64 => FieldValue::Double(downcast::<Float64Array>(array)?.value(row)),
        DataType::Utf8 => {
            FieldValue::String(downcast::<StringArray>(array)?.value(row).to_string())
        }
        DataType::LargeUtf8 => {
            FieldValue::String(downcast::<LargeStringArray>(array)?.value(row).to_string())
        }
        DataType::Binary => FieldValue::Bytes(Bytes::copy_from_slice(
            downcast::<BinaryArray>(array)?.value(row),
        )),
        DataType::LargeBinary => FieldValue::Bytes(Bytes::copy_from_slice(
            downcast::<LargeBinaryArray>(array)?.value(row),
        )),
        other => return Err(format!("unmappable column type {}", other)),
    };
    Ok(Some(value))
}

/// Extract one event-timestamp cell as epoch milliseconds; `Ok(None)` means null
fn timestamp_ms(array: &dyn Array, row: usize) -> std::result::Result<Option<i64>, String> {
    if array.is_null(row) {
        return Ok(None);
    }
    let ms = match array.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => {
            downcast::<TimestampSecondArray>(array)?.value(row) * 1_000
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            downcast::<TimestampMillisecondArray>(array)?.value(row)
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            downcast::<TimestampMicrosecondArray>(array)?.value(row) / 1_000
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            downcast::<TimestampNanosecondArray>(array)?.value(row) / 1_000_000
        }
        // A plain integer column is treated as epoch milliseconds
        DataType::Int64 => downcast::<Int64Array>(array)?.value(row),
        other => return Err(format!("unsupported event timestamp type {}", other)),
    };
    Ok(Some(ms))
}

fn downcast<T: 'static>(array: &dyn Array) -> std::result::Result<&T, String> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| "column array downcast failed".to_string())
}
