use anyhow::{anyhow, Result};
use arrow::datatypes::SchemaRef;
use std::path::PathBuf;

use crate::cli::{self, Cli};
use crate::schema::{record_schema, Column};

pub const DEFAULT_CHUNK_SIZE: usize = 100_000;
pub const DEFAULT_OUTPUT_DIR: &str = "output/log_datalake";
pub const DEFAULT_ERROR_FILE: &str = "errors/incorrect_data.txt";
pub const DEFAULT_WAREHOUSE_DIR: &str = "warehouse";
pub const DEFAULT_TABLE_NAME: &str = "joined_log_table";

/// Everything a pipeline run needs, passed explicitly from stage to stage
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub join: JoinConfig,
    pub warehouse: WarehouseConfig,
    pub error_file: PathBuf,
    pub stats: bool,
}

/// Where to find the raw logs
#[derive(Debug, Clone)]
pub struct InputConfig {
    pub directory: PathBuf,
    pub pattern: String,
}

/// Dataset destination and batching
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub destination_root: PathBuf,
    pub partition_field: Option<Column>,
    pub chunk_size: usize,
    pub write_mode: WriteMode,
    pub compression: ParquetCompression,
    pub schema: SchemaRef,
}

/// Hostname enrichment
#[derive(Debug, Clone)]
pub struct JoinConfig {
    pub side_file: PathBuf,
    pub kind: JoinKind,
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub directory: PathBuf,
    pub table_name: String,
}

/// Behaviour when the dataset destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Overwrite,
    ErrorIfExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
}

impl From<cli::WriteMode> for WriteMode {
    fn from(mode: cli::WriteMode) -> Self {
        match mode {
            cli::WriteMode::Overwrite => WriteMode::Overwrite,
            cli::WriteMode::ErrorIfExists => WriteMode::ErrorIfExists,
        }
    }
}

impl From<cli::JoinKind> for JoinKind {
    fn from(kind: cli::JoinKind) -> Self {
        match kind {
            cli::JoinKind::Inner => JoinKind::Inner,
            cli::JoinKind::Left => JoinKind::Left,
        }
    }
}

impl From<cli::Compression> for ParquetCompression {
    fn from(compression: cli::Compression) -> Self {
        match compression {
            cli::Compression::None => ParquetCompression::Uncompressed,
            cli::Compression::Snappy => ParquetCompression::Snappy,
            cli::Compression::Gzip => ParquetCompression::Gzip,
            cli::Compression::Zstd => ParquetCompression::Zstd,
        }
    }
}

impl OutputConfig {
    pub fn new(destination_root: impl Into<PathBuf>) -> Self {
        Self {
            destination_root: destination_root.into(),
            partition_field: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            write_mode: WriteMode::default(),
            compression: ParquetCompression::default(),
            schema: record_schema(),
        }
    }
}

impl PipelineConfig {
    /// Configuration with every optional setting at its default
    pub fn new(
        directory: impl Into<PathBuf>,
        pattern: impl Into<String>,
        side_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: InputConfig {
                directory: directory.into(),
                pattern: pattern.into(),
            },
            output: OutputConfig::new(DEFAULT_OUTPUT_DIR),
            join: JoinConfig {
                side_file: side_file.into(),
                kind: JoinKind::default(),
            },
            warehouse: WarehouseConfig {
                directory: PathBuf::from(DEFAULT_WAREHOUSE_DIR),
                table_name: DEFAULT_TABLE_NAME.to_string(),
            },
            error_file: PathBuf::from(DEFAULT_ERROR_FILE),
            stats: false,
        }
    }

    pub fn from_cli(cli: &Cli) -> Self {
        let mut config = Self::new(&cli.log_dir, cli.log_pattern.clone(), &cli.hostname_file);

        if let Some(dir) = &cli.output_dir {
            config.output.destination_root = dir.clone();
        }
        config.output.partition_field = cli.partition_field;
        if let Some(chunk_size) = cli.chunk_size {
            config.output.chunk_size = chunk_size;
        }
        config.output.write_mode = cli.write_mode.into();
        config.output.compression = cli.compression.into();
        config.join.kind = cli.join.into();
        if let Some(dir) = &cli.warehouse_dir {
            config.warehouse.directory = dir.clone();
        }
        if let Some(name) = &cli.table_name {
            config.warehouse.table_name = name.clone();
        }
        if let Some(path) = &cli.error_file {
            config.error_file = path.clone();
        }
        config.stats = cli.stats;
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.pattern.trim().is_empty() {
            return Err(anyhow!("log file pattern cannot be empty"));
        }
        if self.output.chunk_size == 0 {
            return Err(anyhow!("chunk size must be at least 1"));
        }
        if self.output.destination_root.as_os_str().is_empty() {
            return Err(anyhow!("output directory cannot be empty"));
        }
        let name = &self.warehouse.table_name;
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(anyhow!(
                "table name '{}' may only contain letters, digits, '_' and '-'",
                name
            ));
        }
        if let Some(field) = self.output.partition_field {
            if self.output.schema.index_of(field.name()).is_err() {
                return Err(anyhow!("partition field '{}' is not in the dataset schema", field));
            }
        }
        Ok(())
    }
}
