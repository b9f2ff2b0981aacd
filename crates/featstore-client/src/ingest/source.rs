//! Source reader and parquet staging
//!
//! Normalizes an ingestion input (in-memory record batches or a file path of
//! a recognized format) into a row-group-chunked parquet staging file. The
//! row-group size is `min(ceil(rows / max_workers), chunk_size)` so every
//! worker gets at least one group and no group exceeds the caller's batch
//! size. The staging file is immutable after creation; encoding workers open
//! independent read handles against it.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ingest::staging::StagingDir;

/// Column carrying the per-row event timestamp, when the source has one
pub const EVENT_TIMESTAMP_COLUMN: &str = "event_timestamp";

/// Reader batch size while normalizing file sources
const READ_BATCH_SIZE: usize = 8192;

/// An ingestion input, resolved to a tagged variant exactly once
#[derive(Debug)]
pub enum IngestSource {
    /// In-memory record batches sharing one schema
    Table(Vec<RecordBatch>),
    /// Path to a file in a recognized format (sniffed by extension)
    Path(PathBuf),
}

impl From<RecordBatch> for IngestSource {
    fn from(batch: RecordBatch) -> Self {
        Self::Table(vec![batch])
    }
}

impl From<Vec<RecordBatch>> for IngestSource {
    fn from(batches: Vec<RecordBatch>) -> Self {
        Self::Table(batches)
    }
}

impl From<PathBuf> for IngestSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for IngestSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

/// Recognized file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Csv,
    Jsonl,
    Parquet,
}

fn sniff_format(path: &Path) -> Result<SourceFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => Ok(SourceFormat::Csv),
        "json" | "jsonl" | "ndjson" => Ok(SourceFormat::Jsonl),
        "parquet" | "pq" => Ok(SourceFormat::Parquet),
        other => Err(Error::unsupported_source(format!(
            "Unrecognized file extension '{}' for '{}'",
            other,
            path.display()
        ))),
    }
}

/// Row-group size: `min(ceil(rows / max_workers), chunk_size)`, at least 1
pub fn row_group_size(rows: usize, max_workers: usize, chunk_size: usize) -> usize {
    let workers = max_workers.max(1);
    let per_worker = rows.div_ceil(workers);
    per_worker.min(chunk_size.max(1)).max(1)
}

/// The staged, immutable columnar snapshot of an ingestion input
#[derive(Debug)]
pub struct StagedTable {
    /// Guard owning the temporary directory; dropped last
    pub staging: StagingDir,
    /// Path of the staging parquet file
    pub path: PathBuf,
    /// Schema of the staged table
    pub schema: SchemaRef,
    /// Total rows staged
    pub rows: usize,
    /// Number of row groups in the staging file
    pub row_groups: usize,
    /// Rows per row group (the final group may be smaller)
    pub row_group_size: usize,
}

/// Normalize a source and persist it to a staging parquet file
///
/// Blocking (file I/O); run under `spawn_blocking` from async contexts.
pub fn stage(source: IngestSource, chunk_size: usize, max_workers: usize) -> Result<StagedTable> {
    let batches = match source {
        IngestSource::Table(batches) => normalize_table(batches)?,
        IngestSource::Path(path) => read_file(&path)?,
    };

    let schema = match batches.first() {
        Some(batch) => batch.schema(),
        None => {
            return Err(Error::conversion(
                "Cannot stage an empty source with no schema",
            ))
        }
    };
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    let group_size = row_group_size(rows, max_workers, chunk_size);

    let staging = StagingDir::create()?;
    let path = staging.path().join("staged.parquet");

    let file = File::create(&path)?;
    let props = WriterProperties::builder()
        .set_max_row_group_size(group_size)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
    for batch in &batches {
        writer.write(batch)?;
    }
    writer.close()?;

    // Read the footer back for the authoritative row-group count
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?;
    let row_groups = reader.metadata().num_row_groups();

    debug!(
        path = %path.display(),
        rows,
        row_groups,
        row_group_size = group_size,
        "staged source table"
    );

    Ok(StagedTable {
        staging,
        path,
        schema,
        rows,
        row_groups,
        row_group_size: group_size,
    })
}

/// Validate that in-memory batches share one schema
fn normalize_table(batches: Vec<RecordBatch>) -> Result<Vec<RecordBatch>> {
    if let Some(first) = batches.first() {
        let schema = first.schema();
        for batch in &batches[1..] {
            if batch.schema() != schema {
                return Err(Error::conversion(
                    "In-memory batches do not share a single schema",
                ));
            }
        }
    }
    Ok(batches)
}

/// Read a recognized file into record batches
fn read_file(path: &Path) -> Result<Vec<RecordBatch>> {
    let format = sniff_format(path)?;
    match format {
        SourceFormat::Csv => read_csv(path),
        SourceFormat::Jsonl => read_jsonl(path),
        SourceFormat::Parquet => read_parquet(path),
    }
}

fn read_csv(path: &Path) -> Result<Vec<RecordBatch>> {
    let mut file = File::open(path)?;
    let format = arrow_csv::reader::Format::default().with_header(true);
    let (schema, _) = format
        .infer_schema(&mut file, None)
        .map_err(|e| Error::conversion(format!("CSV schema inference failed: {}", e)))?;
    file.seek(SeekFrom::Start(0))?;

    let reader = arrow_csv::ReaderBuilder::new(Arc::new(schema))
        .with_format(format)
        .with_batch_size(READ_BATCH_SIZE)
        .build(file)
        .map_err(|e| Error::conversion(format!("CSV read failed: {}", e)))?;
    reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::conversion(format!("CSV read failed: {}", e)))
}

fn read_jsonl(path: &Path) -> Result<Vec<RecordBatch>> {
    let mut reader = BufReader::new(File::open(path)?);
    let (schema, _) = arrow_json::reader::infer_json_schema_from_seekable(&mut reader, None)
        .map_err(|e| Error::conversion(format!("JSON schema inference failed: {}", e)))?;

    let reader = arrow_json::ReaderBuilder::new(Arc::new(schema))
        .with_batch_size(READ_BATCH_SIZE)
        .build(reader)
        .map_err(|e| Error::conversion(format!("JSON read failed: {}", e)))?;
    reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::conversion(format!("JSON read failed: {}", e)))
}

fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)
        .map_err(|e| Error::conversion(format!("Parquet read failed: {}", e)))?
        .with_batch_size(READ_BATCH_SIZE)
        .build()
        .map_err(|e| Error::conversion(format!("Parquet read failed: {}", e)))?;
    reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::conversion(format!("Parquet read failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Float64Array, Int64Array};
    use arrow_schema::{DataType, Field, Schema};
    use std::io::Write;

    pub(crate) fn sample_batch(rows: usize) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("driver_id", DataType::Int64, false),
            Field::new("rating", DataType::Float64, true),
        ]));
        let ids: Int64Array = (0..rows as i64).collect();
        let ratings: Float64Array = (0..rows).map(|i| Some(i as f64 / 10.0)).collect();
        RecordBatch::try_new(schema, vec![Arc::new(ids), Arc::new(ratings)]).unwrap()
    }

    #[test]
    fn test_row_group_size_formula() {
        // min(ceil(R/W), C) across a small grid
        for (rows, workers, chunk, expected) in [
            (10, 2, 5, 5),
            (10, 2, 3, 3),
            (10, 4, 100, 3),
            (1, 8, 100, 1),
            (0, 4, 10, 1),
            (100, 1, 10, 10),
            (7, 3, 7, 3),
        ] {
            assert_eq!(
                row_group_size(rows, workers, chunk),
                expected,
                "rows={} workers={} chunk={}",
                rows,
                workers,
                chunk
            );
        }
    }

    #[test]
    fn test_row_group_size_clamps_workers() {
        assert_eq!(row_group_size(10, 0, 5), 5);
        assert_eq!(row_group_size(10, 0, 100), 10);
    }

    #[test]
    fn test_stage_in_memory_table_partitions_rows() {
        let staged = stage(sample_batch(10).into(), 5, 2).unwrap();
        assert_eq!(staged.rows, 10);
        assert_eq!(staged.row_group_size, 5);
        assert_eq!(staged.row_groups, 2);

        // Row groups partition all rows with no loss or duplication
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&staged.path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let total: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_stage_uneven_final_group() {
        let staged = stage(sample_batch(11).into(), 4, 3).unwrap();
        // ceil(11/3) = 4, min(4, 4) = 4 -> groups of 4, 4, 3
        assert_eq!(staged.row_group_size, 4);
        assert_eq!(staged.row_groups, 3);
    }

    #[test]
    fn test_stage_rejects_mismatched_batches() {
        let other_schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Utf8, true)]));
        let other = RecordBatch::new_empty(other_schema);
        let err = stage(vec![sample_batch(2), other].into(), 5, 1).unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
    }

    #[test]
    fn test_stage_rejects_empty_source() {
        let err = stage(Vec::<RecordBatch>::new().into(), 5, 1).unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let err = stage(Path::new("/tmp/data.xlsx").into(), 5, 1).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSource(_)));
    }

    #[test]
    fn test_stage_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "driver_id,rating").unwrap();
        for i in 0..6 {
            writeln!(f, "{},{}", i, i as f64 / 2.0).unwrap();
        }
        drop(f);

        let staged = stage(path.as_path().into(), 3, 2).unwrap();
        assert_eq!(staged.rows, 6);
        assert_eq!(staged.row_group_size, 3);
        assert_eq!(staged.row_groups, 2);
    }

    #[test]
    fn test_stage_jsonl_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        let mut f = File::create(&path).unwrap();
        for i in 0..4 {
            writeln!(f, "{{\"driver_id\": {}, \"rating\": {}.5}}", i, i).unwrap();
        }
        drop(f);

        let staged = stage(path.as_path().into(), 10, 1).unwrap();
        assert_eq!(staged.rows, 4);
        assert_eq!(staged.row_groups, 1);
    }

    #[test]
    fn test_staging_dir_removed_on_drop() {
        let dir_path = {
            let staged = stage(sample_batch(3).into(), 5, 1).unwrap();
            staged.staging.path().to_path_buf()
        };
        assert!(!dir_path.exists());
    }
}
