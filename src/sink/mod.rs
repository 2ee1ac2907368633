//! Chunked Parquet writer.
//!
//! Normalized records are buffered until `chunk_size` of them are held, then
//! encoded and written as one file per partition key. Whatever is still
//! buffered when the input ends is written the same way.

pub mod encoder;
pub mod partition;

use indexmap::IndexMap;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use crate::config::{OutputConfig, ParquetCompression, WriteMode};
use crate::dataset::{DataFile, Dataset};
use crate::error::{PipelineError, Result};
use crate::normalize::NormalizedRecord;
use crate::stats::{stats_add_batch_flushed, stats_add_record_skipped, stats_add_records_written};
use encoder::BatchEncoder;

pub fn writer_properties(compression: ParquetCompression) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(match compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
        })
        .build()
}

/// Write `batches` to a single Parquet file at `path`, creating parent directories.
///
/// Batches are written as they arrive. An error from the batch stream is
/// returned unchanged; errors from the file itself become [`PipelineError::Flush`].
pub fn write_parquet<I>(path: &Path, schema: SchemaRef, batches: I, props: WriterProperties) -> Result<usize>
where
    I: IntoIterator<Item = Result<RecordBatch>>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::flush(parent, e))?;
    }
    let file = File::create(path).map_err(|e| PipelineError::flush(path, e))?;
    let mut writer =
        ArrowWriter::try_new(file, schema, Some(props)).map_err(|e| PipelineError::flush(path, e))?;
    let mut rows = 0;
    for batch in batches {
        let batch = batch?;
        rows += batch.num_rows();
        writer.write(&batch).map_err(|e| PipelineError::flush(path, e))?;
    }
    writer.close().map_err(|e| PipelineError::flush(path, e))?;
    Ok(rows)
}

/// Part files and partition directories directly under `root`.
///
/// Anything else under the root belongs to someone else and is never listed.
fn dataset_artifacts(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PipelineError::flush(root, e)),
    };

    let mut artifacts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::flush(root, e))?;
        let file_type = entry.file_type().map_err(|e| PipelineError::flush(entry.path(), e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if (file_type.is_file() && partition::is_part_file(&name))
            || (file_type.is_dir() && partition::is_partition_dir(&name))
        {
            artifacts.push(entry.path());
        }
    }
    artifacts.sort();
    Ok(artifacts)
}

/// Delete one artifact. Partition directories lose their part files and are
/// removed only once nothing else is left in them.
fn remove_artifact(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return fs::remove_file(path).map_err(|e| PipelineError::flush(path, e));
    }

    let mut kept = 0;
    for entry in fs::read_dir(path).map_err(|e| PipelineError::flush(path, e))? {
        let entry = entry.map_err(|e| PipelineError::flush(path, e))?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if is_file && partition::is_part_file(&entry.file_name().to_string_lossy()) {
            fs::remove_file(entry.path()).map_err(|e| PipelineError::flush(entry.path(), e))?;
        } else {
            kept += 1;
        }
    }

    if kept == 0 {
        fs::remove_dir(path).map_err(|e| PipelineError::flush(path, e))?;
    } else {
        warn!(path = %path.display(), kept, "partition directory holds other entries, leaving it in place");
    }
    Ok(())
}

/// Make the destination root ready for a fresh dataset.
///
/// Only files this writer produces count as an existing dataset, and only
/// those are removed in [`WriteMode::Overwrite`].
fn prepare_destination(root: &Path, mode: WriteMode) -> Result<()> {
    let artifacts = dataset_artifacts(root)?;

    if !artifacts.is_empty() {
        match mode {
            WriteMode::ErrorIfExists => {
                return Err(PipelineError::DestinationExists {
                    path: root.to_path_buf(),
                })
            }
            WriteMode::Overwrite => {
                info!(path = %root.display(), entries = artifacts.len(), "replacing existing dataset");
                for artifact in &artifacts {
                    remove_artifact(artifact)?;
                }
            }
        }
    }

    fs::create_dir_all(root).map_err(|e| PipelineError::flush(root, e))
}

pub struct ChunkedWriter {
    config: OutputConfig,
    props: WriterProperties,
    buffer: Vec<NormalizedRecord>,
    batch_index: usize,
    files: Vec<DataFile>,
}

impl ChunkedWriter {
    /// Prepare the destination according to the write mode and start at batch 0.
    pub fn create(config: &OutputConfig) -> Result<Self> {
        prepare_destination(&config.destination_root, config.write_mode)?;
        Ok(Self {
            config: config.clone(),
            props: writer_properties(config.compression),
            buffer: Vec::with_capacity(config.chunk_size.min(1 << 16)),
            batch_index: 0,
            files: Vec::new(),
        })
    }

    pub fn push(&mut self, record: NormalizedRecord) -> Result<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.config.chunk_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Encode and write the buffered records; returns the number of rows written.
    pub fn flush(&mut self) -> Result<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let records = std::mem::take(&mut self.buffer);
        let partition_field = self.config.partition_field;

        let mut groups: IndexMap<Option<String>, BatchEncoder> = IndexMap::new();
        for record in &records {
            let key = partition_field.map(|field| record.value_string(field));
            let encoder = groups
                .entry(key)
                .or_insert_with(|| BatchEncoder::new(self.config.schema.clone()));
            if let Err(e) = encoder.append(record) {
                stats_add_record_skipped();
                warn!(batch = self.batch_index, host = %record.host, "skipping record: {}", e);
            }
        }

        let mut rows_written = 0;
        let mut files_written = 0;
        let mut buffer_bytes = 0;
        for (key, encoder) in groups {
            if encoder.is_empty() {
                continue;
            }
            let batch = encoder.finish()?;
            let rows = batch.num_rows();
            buffer_bytes += batch.get_array_memory_size();

            let path = partition::file_path(
                &self.config.destination_root,
                partition_field.zip(key.as_deref()),
                self.batch_index,
            );
            write_parquet(&path, batch.schema(), std::iter::once(Ok(batch)), self.props.clone())?;
            debug!(path = %path.display(), rows, "wrote dataset file");

            rows_written += rows;
            files_written += 1;
            self.files.push(DataFile {
                path,
                partition_value: key,
                rows,
            });
        }

        stats_add_records_written(rows_written);
        stats_add_batch_flushed(files_written);
        info!(
            batch = self.batch_index,
            records = rows_written,
            files = files_written,
            buffer_bytes,
            "flushed batch"
        );
        self.batch_index += 1;
        Ok(rows_written)
    }

    /// Flush the final partial batch and hand back the written dataset.
    pub fn finish(mut self) -> Result<Dataset> {
        self.flush()?;
        Ok(Dataset::from_parts(
            self.config.destination_root,
            self.config.partition_field,
            self.config.schema,
            self.files,
        ))
    }
}

/// Drain `records` into a chunked dataset at `config.destination_root`.
///
/// The first error from the stream or from a flush stops the write; batches
/// already flushed stay on disk.
pub fn write<I>(records: I, config: &OutputConfig) -> Result<Dataset>
where
    I: IntoIterator<Item = Result<NormalizedRecord>>,
{
    let mut writer = ChunkedWriter::create(config)?;
    for record in records {
        writer.push(record?)?;
    }
    writer.finish()
}
