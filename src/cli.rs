// Command-line interface definitions

use clap::Parser;
use std::path::PathBuf;

use crate::schema::Column;

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default)]
pub enum WriteMode {
    /// Replace an existing dataset at the destination
    #[default]
    Overwrite,
    /// Refuse to run when the destination already exists
    ErrorIfExists,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default)]
pub enum JoinKind {
    /// Drop log rows whose host has no hostname entry
    #[default]
    Inner,
    /// Keep unmatched log rows with an empty hostname
    Left,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default)]
pub enum Compression {
    None,
    #[default]
    Snappy,
    Gzip,
    Zstd,
}

#[derive(Parser, Debug)]
#[command(name = "loglake")]
#[command(about = "Load web-server access logs into a partitioned Parquet dataset and a warehouse table")]
#[command(
    long_about = "Load web-server access logs into a partitioned Parquet dataset and a warehouse table\n\nSTAGES (always in this order):\n  read -> parse -> normalize -> write dataset -> join hostnames -> load warehouse"
)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Directory searched recursively for log files
    #[arg(long = "log-dir", help_heading = "Input Options")]
    pub log_dir: PathBuf,

    /// File name pattern, e.g. 'access*.log*' (.gz and .zst are decompressed)
    #[arg(long = "log-pattern", help_heading = "Input Options")]
    pub log_pattern: String,

    /// CSV file with `client` and `hostname` columns
    #[arg(long = "hostname-file", help_heading = "Input Options")]
    pub hostname_file: PathBuf,

    /// File receiving lines that do not parse
    #[arg(long = "error-file", help_heading = "Input Options")]
    pub error_file: Option<PathBuf>,

    /// Root directory of the Parquet dataset
    #[arg(short = 'o', long = "output-dir", help_heading = "Dataset Options")]
    pub output_dir: Option<PathBuf>,

    /// Partition the dataset into `<field>=<value>` subdirectories
    #[arg(short = 'p', long = "partition-field", help_heading = "Dataset Options")]
    pub partition_field: Option<Column>,

    /// Records buffered per batch before flushing to disk
    #[arg(long = "chunk-size", help_heading = "Dataset Options")]
    pub chunk_size: Option<usize>,

    /// What to do when the output directory already exists
    #[arg(long = "write-mode", value_enum, default_value = "overwrite", help_heading = "Dataset Options")]
    pub write_mode: WriteMode,

    /// Parquet compression codec
    #[arg(long = "compression", value_enum, default_value = "snappy", help_heading = "Dataset Options")]
    pub compression: Compression,

    /// Join semantics against the hostname file
    #[arg(long = "join", value_enum, default_value = "inner", help_heading = "Warehouse Options")]
    pub join: JoinKind,

    /// Directory holding warehouse tables
    #[arg(long = "warehouse-dir", help_heading = "Warehouse Options")]
    pub warehouse_dir: Option<PathBuf>,

    /// Name of the table created (or replaced) in the warehouse
    #[arg(long = "table-name", help_heading = "Warehouse Options")]
    pub table_name: Option<String>,

    /// Print processing statistics on exit
    #[arg(short = 's', long = "stats", help_heading = "Display Options")]
    pub stats: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long = "log-level", default_value = "info", help_heading = "Display Options")]
    pub log_level: String,

    /// Use this config file instead of the usual search locations
    #[arg(long = "config-file", help_heading = "Configuration Options")]
    pub config_file: Option<String>,

    /// Do not load any config file
    #[arg(long = "ignore-config", help_heading = "Configuration Options")]
    pub ignore_config: bool,

    /// Show config file locations and active defaults, then exit
    #[arg(long = "show-config", help_heading = "Configuration Options")]
    pub show_config: bool,
}
