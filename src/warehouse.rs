//! File-backed analytical warehouse.
//!
//! Each table is one Parquet file `<name>.parquet` in the warehouse
//! directory, listed in `catalog.json`. Loading a table writes a temporary
//! file and renames it over the previous one, so readers see either the old
//! table or the new one.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ParquetCompression;
use crate::error::{PipelineError, Result};
use crate::sink::{write_parquet, writer_properties};
use crate::stats::stats_add_rows_loaded;

const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub file: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    tables: BTreeMap<String, TableEntry>,
}

/// Open warehouse handle; the catalog is saved again when it is closed or dropped.
pub struct Warehouse {
    directory: PathBuf,
    catalog: Catalog,
    closed: bool,
}

fn valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl Warehouse {
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| PipelineError::Io {
            path: directory.clone(),
            source: e,
        })?;

        let catalog_path = directory.join(CATALOG_FILE);
        let catalog = if catalog_path.is_file() {
            let content = fs::read_to_string(&catalog_path).map_err(|e| PipelineError::Io {
                path: catalog_path.clone(),
                source: e,
            })?;
            serde_json::from_str(&content).map_err(|e| PipelineError::warehouse(CATALOG_FILE, e))?
        } else {
            Catalog::default()
        };

        Ok(Self {
            directory,
            catalog,
            closed: false,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}.parquet", name))
    }

    pub fn table(&self, name: &str) -> Option<&TableEntry> {
        self.catalog.tables.get(name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.catalog.tables.keys().map(String::as_str).collect()
    }

    /// Create `name` from a stream of batches, replacing any table already
    /// stored under it. The previous table stays in place if the stream fails.
    pub fn load<I>(&mut self, name: &str, schema: SchemaRef, batches: I) -> Result<usize>
    where
        I: IntoIterator<Item = Result<RecordBatch>>,
    {
        if !valid_table_name(name) {
            return Err(PipelineError::warehouse(name, "invalid table name"));
        }

        let final_path = self.table_path(name);
        let temp_path = self.directory.join(format!(".{}.parquet.tmp", name));
        let props = writer_properties(ParquetCompression::Snappy);
        let rows = match write_parquet(&temp_path, schema.clone(), batches, props) {
            Ok(rows) => rows,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(e);
            }
        };
        fs::rename(&temp_path, &final_path).map_err(|e| PipelineError::warehouse(name, e))?;

        let replaced = self.catalog.tables.insert(
            name.to_string(),
            TableEntry {
                file: format!("{}.parquet", name),
                rows,
                columns: schema.fields().iter().map(|f| f.name().clone()).collect(),
                loaded_at: Utc::now(),
            },
        );
        self.save_catalog()?;

        stats_add_rows_loaded(rows);
        info!(
            table = name,
            rows,
            replaced = replaced.is_some(),
            path = %final_path.display(),
            "loaded warehouse table"
        );
        Ok(rows)
    }

    pub fn read_table(&self, name: &str) -> Result<Vec<RecordBatch>> {
        if self.table(name).is_none() {
            return Err(PipelineError::warehouse(name, "no such table"));
        }
        let path = self.table_path(name);
        let file = File::open(&path).map_err(|e| PipelineError::warehouse(name, e))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .and_then(|builder| builder.build())
            .map_err(|e| PipelineError::warehouse(name, e))?;
        reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::warehouse(name, e))
    }

    fn save_catalog(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.catalog)
            .map_err(|e| PipelineError::warehouse(CATALOG_FILE, e))?;
        let temp_path = self.directory.join(format!(".{}.tmp", CATALOG_FILE));
        fs::write(&temp_path, content).map_err(|e| PipelineError::warehouse(CATALOG_FILE, e))?;
        fs::rename(&temp_path, self.directory.join(CATALOG_FILE))
            .map_err(|e| PipelineError::warehouse(CATALOG_FILE, e))
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.save_catalog()
    }
}

impl Drop for Warehouse {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.save_catalog() {
            warn!(directory = %self.directory.display(), "failed to save warehouse catalog: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::joined_schema;
    use arrow::array::{ArrayRef, AsArray, Int64Array, StringArray, TimestampMicrosecondArray};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn joined(hosts: &[&str]) -> Vec<Result<RecordBatch>> {
        let n = hosts.len();
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(hosts.to_vec())),
            Arc::new(TimestampMicrosecondArray::from(vec![0i64; n]).with_timezone("UTC")),
            Arc::new(StringArray::from(vec!["GET"; n])),
            Arc::new(StringArray::from(vec!["/"; n])),
            Arc::new(Int64Array::from(vec![200i64; n])),
            Arc::new(Int64Array::from(vec![1i64; n])),
            Arc::new(StringArray::from(vec![Some("box"); n])),
        ];
        vec![Ok(RecordBatch::try_new(joined_schema(), columns).unwrap())]
    }

    #[test]
    fn test_load_and_read_back() {
        let dir = TempDir::new().unwrap();
        let mut warehouse = Warehouse::open(dir.path()).unwrap();
        assert_eq!(warehouse.load("joined_log_table", joined_schema(), joined(&["a", "b"])).unwrap(), 2);

        let batches = warehouse.read_table("joined_log_table").unwrap();
        let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(rows, 2);
        assert_eq!(batches[0].schema().field(6).name(), "hostname");
        assert_eq!(batches[0].column(0).as_string::<i32>().value(1), "b");
        warehouse.close().unwrap();
    }

    #[test]
    fn test_load_replaces_existing_table() {
        let dir = TempDir::new().unwrap();
        let mut warehouse = Warehouse::open(dir.path()).unwrap();
        warehouse.load("t", joined_schema(), joined(&["a", "b", "c"])).unwrap();
        warehouse.load("t", joined_schema(), joined(&["z"])).unwrap();

        let rows: usize = warehouse.read_table("t").unwrap().iter().map(RecordBatch::num_rows).sum();
        assert_eq!(rows, 1);
        assert_eq!(warehouse.table_names(), vec!["t"]);
        assert!(!dir.path().join(".t.parquet.tmp").exists());
    }

    #[test]
    fn test_catalog_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut warehouse = Warehouse::open(dir.path()).unwrap();
            warehouse.load("first", joined_schema(), joined(&["a"])).unwrap();
        }
        let warehouse = Warehouse::open(dir.path()).unwrap();
        let entry = warehouse.table("first").unwrap();
        assert_eq!(entry.rows, 1);
        assert_eq!(entry.columns.len(), 7);
        assert_eq!(entry.file, "first.parquet");
    }

    #[test]
    fn test_empty_table_keeps_schema() {
        let dir = TempDir::new().unwrap();
        let mut warehouse = Warehouse::open(dir.path()).unwrap();
        assert_eq!(warehouse.load("empty", joined_schema(), Vec::new()).unwrap(), 0);
        assert!(warehouse.read_table("empty").unwrap().is_empty());
        assert_eq!(warehouse.table("empty").unwrap().columns[6], "hostname");
    }

    #[test]
    fn test_failed_load_keeps_previous_table() {
        let dir = TempDir::new().unwrap();
        let mut warehouse = Warehouse::open(dir.path()).unwrap();
        warehouse.load("t", joined_schema(), joined(&["a", "b"])).unwrap();

        let mut failing = joined(&["x"]);
        failing.push(Err(PipelineError::Schema("broken input".to_string())));
        let err = warehouse.load("t", joined_schema(), failing).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));

        assert_eq!(warehouse.table("t").unwrap().rows, 2);
        let rows: usize = warehouse.read_table("t").unwrap().iter().map(RecordBatch::num_rows).sum();
        assert_eq!(rows, 2);
        assert!(!dir.path().join(".t.parquet.tmp").exists());
    }

    #[test]
    fn test_unknown_and_invalid_tables() {
        let dir = TempDir::new().unwrap();
        let mut warehouse = Warehouse::open(dir.path()).unwrap();
        assert!(warehouse.read_table("missing").is_err());
        assert!(warehouse.load("../escape", joined_schema(), joined(&["a"])).is_err());
    }
}
