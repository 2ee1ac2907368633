//! Error types for the ingestion pipeline.
//!
//! Only unrecoverable conditions are represented here. Malformed lines and
//! records that fail to encode are absorbed by the stage that sees them and
//! show up in [`crate::stats::ProcessingStats`] instead.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A file or directory could not be opened, read or created.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A compressed input could not be decoded.
    #[error("failed to decompress {} near line {line}: {source}", path.display())]
    Decompression {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    /// The input directory/pattern combination is not a valid glob.
    #[error("invalid file pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// `bytes` or `status` is not a non-negative integer.
    #[error("cannot coerce field '{field}' value {value:?} to an integer (record {record_index}, {origin})")]
    Coercion {
        field: &'static str,
        value: String,
        record_index: usize,
        origin: String,
    },

    /// A required column is missing from the dataset or the side file.
    #[error("schema error: {0}")]
    Schema(String),

    /// Writing or closing a dataset file failed.
    #[error("failed to flush {}: {message}", path.display())]
    Flush { path: PathBuf, message: String },

    /// The destination already holds a dataset and the write mode forbids replacing it.
    #[error("destination {} already exists", path.display())]
    DestinationExists { path: PathBuf },

    /// Reading a written dataset back failed.
    #[error("failed to read dataset file {}: {message}", path.display())]
    Dataset { path: PathBuf, message: String },

    /// The hostname side file could not be read as a delimited table.
    #[error("failed to read side file {}: {source}", path.display())]
    SideFile {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Arrow kernel failure while joining or projecting.
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Loading into or reading from the warehouse failed.
    #[error("warehouse error for table '{table}': {message}")]
    Warehouse { table: String, message: String },

    /// The error sink could not be opened or appended to.
    #[error("failed to write error sink {}: {source}", path.display())]
    ErrorSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn flush(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        PipelineError::Flush {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn dataset(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        PipelineError::Dataset {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn warehouse(table: impl Into<String>, err: impl std::fmt::Display) -> Self {
        PipelineError::Warehouse {
            table: table.into(),
            message: err.to_string(),
        }
    }

    /// Short category label used in logs and the final summary.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Io { .. }
            | PipelineError::Decompression { .. }
            | PipelineError::Pattern { .. } => "input",
            PipelineError::Coercion { .. } => "coercion",
            PipelineError::Schema(_) | PipelineError::SideFile { .. } => "join",
            PipelineError::Flush { .. }
            | PipelineError::DestinationExists { .. }
            | PipelineError::ErrorSink { .. } => "flush",
            PipelineError::Dataset { .. } | PipelineError::Arrow(_) => "dataset",
            PipelineError::Warehouse { .. } => "warehouse",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coercion_message_carries_origin() {
        let err = PipelineError::Coercion {
            field: "bytes",
            value: "abc".to_string(),
            record_index: 7,
            origin: "logs/access.log:12".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("bytes"));
        assert!(msg.contains("\"abc\""));
        assert!(msg.contains("record 7"));
        assert!(msg.contains("logs/access.log:12"));
        assert_eq!(err.category(), "coercion");
    }

    #[test]
    fn test_flush_helper() {
        let err = PipelineError::flush("/tmp/out/part-00000.parquet", "disk full");
        assert_eq!(err.category(), "flush");
        assert!(err.to_string().contains("disk full"));
    }
}
