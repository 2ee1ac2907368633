//! Handle on a written Parquet dataset.
//!
//! A dataset is a root directory holding `part-NNNNN.parquet` files, either
//! directly or under `<field>=<value>/` partition directories. Files are read
//! back one at a time, so scanning never holds more than one record batch.

use arrow::array::{Array, AsArray};
use arrow::datatypes::{Int64Type, SchemaRef, TimestampMicrosecondType};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ProjectionMask;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::normalize::NormalizedRecord;
use crate::schema::{record_schema, Column};
use crate::sink::partition::{is_part_file, parse_partition_dir};

/// One Parquet file of a dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    pub path: PathBuf,
    pub partition_value: Option<String>,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    root: PathBuf,
    partition_field: Option<Column>,
    schema: SchemaRef,
    files: Vec<DataFile>,
}

fn open_builder(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
    let file = File::open(path).map_err(|e| PipelineError::dataset(path, e))?;
    ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| PipelineError::dataset(path, e))
}

impl Dataset {
    pub(crate) fn from_parts(
        root: PathBuf,
        partition_field: Option<Column>,
        schema: SchemaRef,
        files: Vec<DataFile>,
    ) -> Self {
        Self {
            root,
            partition_field,
            schema,
            files,
        }
    }

    /// Discover every part file under `root`, in path order.
    ///
    /// A directory that cannot be listed is an error rather than a gap in
    /// the dataset.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(PipelineError::dataset(root, "not a directory"));
        }

        let pattern = format!("{}/**/part-*.parquet", glob::Pattern::escape(&root.to_string_lossy()));
        let mut paths = Vec::new();
        for entry in glob::glob(&pattern).map_err(|e| PipelineError::dataset(root, e))? {
            let path = entry.map_err(|e| PipelineError::dataset(e.path(), e.error()))?;
            let is_part = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_part_file);
            if is_part && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut partition_field = None;
        let mut schema = None;
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let builder = open_builder(&path)?;
            let rows = usize::try_from(builder.metadata().file_metadata().num_rows())
                .map_err(|e| PipelineError::dataset(&path, e))?;
            if schema.is_none() {
                schema = Some(builder.schema().clone());
            }

            let partition = path
                .parent()
                .and_then(|dir| dir.strip_prefix(root).ok())
                .and_then(|rel| rel.to_str())
                .and_then(parse_partition_dir);
            let partition_value = match partition {
                Some(dir) => {
                    let field = dir.field.parse::<Column>().ok();
                    partition_field = field.or(partition_field);
                    match (dir.value, field) {
                        (Some(value), _) => Some(value),
                        (None, Some(column)) => first_value(&path, column)?,
                        (None, None) => None,
                    }
                }
                None => None,
            };

            files.push(DataFile {
                path,
                partition_value,
                rows,
            });
        }

        Ok(Self {
            root: root.to_path_buf(),
            partition_field,
            schema: schema.unwrap_or_else(record_schema),
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_field(&self) -> Option<Column> {
        self.partition_field
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn files(&self) -> &[DataFile] {
        &self.files
    }

    pub fn num_rows(&self) -> usize {
        self.files.iter().map(|f| f.rows).sum()
    }

    /// Record batches of every file, file by file
    pub fn scan(&self) -> DatasetScan {
        DatasetScan {
            files: self.files.iter().map(|f| f.path.clone()).collect::<Vec<_>>().into_iter(),
            current: None,
            finished: false,
        }
    }

    /// Decoded rows of every file; mainly for inspection and tests.
    pub fn records(&self) -> impl Iterator<Item = Result<NormalizedRecord>> + '_ {
        self.scan()
            .flat_map(|batch| match batch.and_then(|b| decode_batch(&b)) {
                Ok(records) => records.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            })
    }
}

/// First-row value of a string column, for partitions whose directory name
/// was shortened
fn first_value(path: &Path, column: Column) -> Result<Option<String>> {
    let builder = open_builder(path)?;
    let index = builder
        .schema()
        .index_of(column.name())
        .map_err(|e| PipelineError::dataset(path, e))?;
    let mask = ProjectionMask::roots(builder.parquet_schema(), [index]);
    let mut reader = builder
        .with_projection(mask)
        .with_batch_size(1)
        .build()
        .map_err(|e| PipelineError::dataset(path, e))?;

    let batch = match reader.next() {
        Some(batch) => batch.map_err(|e| PipelineError::dataset(path, e))?,
        None => return Ok(None),
    };
    let values = batch.column(0).as_string_opt::<i32>().ok_or_else(|| {
        PipelineError::dataset(path, format!("partition column '{}' is not a string column", column))
    })?;
    Ok((!values.is_empty() && values.is_valid(0)).then(|| values.value(0).to_string()))
}

pub struct DatasetScan {
    files: std::vec::IntoIter<PathBuf>,
    current: Option<(PathBuf, ParquetRecordBatchReader)>,
    finished: bool,
}

impl Iterator for DatasetScan {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if let Some((path, reader)) = self.current.as_mut() {
                match reader.next() {
                    Some(Ok(batch)) => return Some(Ok(batch)),
                    Some(Err(e)) => {
                        let err = PipelineError::dataset(path.as_path(), e);
                        self.finished = true;
                        return Some(Err(err));
                    }
                    None => {}
                }
                self.current = None;
            }

            let path = match self.files.next() {
                Some(path) => path,
                None => {
                    self.finished = true;
                    return None;
                }
            };
            let reader = match open_builder(&path).and_then(|builder| {
                builder.build().map_err(|e| PipelineError::dataset(&path, e))
            }) {
                Ok(reader) => reader,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            self.current = Some((path, reader));
        }
    }
}

fn missing(column: Column) -> PipelineError {
    PipelineError::Schema(format!("dataset column '{}' is missing or has the wrong type", column))
}

fn string_column(batch: &RecordBatch, column: Column) -> Result<&arrow::array::StringArray> {
    batch
        .column_by_name(column.name())
        .and_then(|c| c.as_string_opt::<i32>())
        .ok_or_else(|| missing(column))
}

fn int_column(batch: &RecordBatch, column: Column) -> Result<&arrow::array::Int64Array> {
    batch
        .column_by_name(column.name())
        .and_then(|c| c.as_primitive_opt::<Int64Type>())
        .ok_or_else(|| missing(column))
}

fn to_u64(column: Column, value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| PipelineError::Schema(format!("negative value {} in column '{}'", value, column)))
}

/// Turn a dataset batch back into records
pub fn decode_batch(batch: &RecordBatch) -> Result<Vec<NormalizedRecord>> {
    let host = string_column(batch, Column::Host)?;
    let referrer = string_column(batch, Column::Referrer)?;
    let user = string_column(batch, Column::User)?;
    let datetime = batch
        .column_by_name(Column::Datetime.name())
        .and_then(|c| c.as_primitive_opt::<TimestampMicrosecondType>())
        .ok_or_else(|| missing(Column::Datetime))?;
    let method = string_column(batch, Column::Method)?;
    let request = string_column(batch, Column::Request)?;
    let proto = string_column(batch, Column::Proto)?;
    let status = int_column(batch, Column::Status)?;
    let bytes = int_column(batch, Column::Bytes)?;
    let http_referred = string_column(batch, Column::HttpReferred)?;
    let user_agent = string_column(batch, Column::UserAgent)?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        if datetime.is_null(row) {
            return Err(missing(Column::Datetime));
        }
        let micros = datetime.value(row);
        let datetime = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
            PipelineError::Schema(format!("timestamp {} out of range", micros))
        })?;

        records.push(NormalizedRecord {
            host: host.value(row).to_string(),
            referrer: referrer.value(row).to_string(),
            user: user.value(row).to_string(),
            datetime,
            method: method.value(row).to_string(),
            request: request.value(row).to_string(),
            proto: proto.value(row).to_string(),
            status: to_u64(Column::Status, status.value(row))?,
            bytes: to_u64(Column::Bytes, bytes.value(row))?,
            http_referred: http_referred.value(row).to_string(),
            user_agent: user_agent.value(row).to_string(),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;
    use crate::sink;
    use crate::timestamp::sentinel_timestamp;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(host: &str, status: u64) -> NormalizedRecord {
        NormalizedRecord {
            host: host.to_string(),
            referrer: "-".to_string(),
            user: "alice".to_string(),
            datetime: Utc.with_ymd_and_hms(2019, 1, 22, 0, 26, 14).unwrap(),
            method: "GET".to_string(),
            request: "/index.html".to_string(),
            proto: "HTTP/1.1".to_string(),
            status,
            bytes: 512,
            http_referred: "-".to_string(),
            user_agent: "curl".to_string(),
        }
    }

    #[test]
    fn test_records_round_trip_through_files() {
        let dir = TempDir::new().unwrap();
        let mut config = OutputConfig::new(dir.path().join("lake"));
        config.chunk_size = 2;
        let mut input = vec![record("a", 200), record("b", 404), record("c", 500)];
        input[2].datetime = sentinel_timestamp();

        sink::write(input.clone().into_iter().map(Ok), &config).unwrap();
        let dataset = Dataset::open(dir.path().join("lake")).unwrap();

        assert_eq!(dataset.files().len(), 2);
        assert_eq!(dataset.num_rows(), 3);
        let output: Vec<NormalizedRecord> = dataset.records().collect::<Result<_>>().unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_open_detects_partitions() {
        let dir = TempDir::new().unwrap();
        let mut config = OutputConfig::new(dir.path().join("lake"));
        config.partition_field = Some(Column::Method);
        let mut post = record("b", 201);
        post.method = "POST".to_string();

        sink::write(vec![Ok(record("a", 200)), Ok(post)], &config).unwrap();
        let dataset = Dataset::open(dir.path().join("lake")).unwrap();

        assert_eq!(dataset.partition_field(), Some(Column::Method));
        let values: Vec<Option<&str>> = dataset
            .files()
            .iter()
            .map(|f| f.partition_value.as_deref())
            .collect();
        assert_eq!(values, vec![Some("GET"), Some("POST")]);
        assert!(dataset.schema().index_of("method").is_ok());
    }

    #[test]
    fn test_open_empty_and_missing() {
        let dir = TempDir::new().unwrap();
        let dataset = Dataset::open(dir.path()).unwrap();
        assert!(dataset.files().is_empty());
        assert_eq!(dataset.scan().count(), 0);
        assert_eq!(dataset.schema().fields().len(), 11);

        assert!(Dataset::open(dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_foreign_parquet_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        let config = OutputConfig::new(dir.path().join("lake"));
        sink::write(vec![Ok(record("a", 200))], &config).unwrap();
        std::fs::write(dir.path().join("lake/notes.parquet"), b"not ours").unwrap();

        let dataset = Dataset::open(dir.path().join("lake")).unwrap();
        assert_eq!(dataset.files().len(), 1);
        assert_eq!(dataset.num_rows(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_partition_is_an_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let mut config = OutputConfig::new(dir.path().join("lake"));
        config.partition_field = Some(Column::Status);
        sink::write(vec![Ok(record("a", 200)), Ok(record("b", 404))], &config).unwrap();

        let locked = dir.path().join("lake/status=404");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Privileged users can list the directory anyway
        let listable = std::fs::read_dir(&locked).is_ok();
        let result = Dataset::open(dir.path().join("lake"));
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        if listable {
            assert_eq!(result.unwrap().num_rows(), 2);
        } else {
            assert!(matches!(result, Err(PipelineError::Dataset { .. })));
        }
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("part-00000.parquet"), b"not parquet").unwrap();
        let err = Dataset::open(dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Dataset { .. }));
    }
}
