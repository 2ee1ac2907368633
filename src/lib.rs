// Core library for the loglake access-log ingestion pipeline

pub mod cli;
pub mod config;
pub mod config_file;
pub mod dataset;
pub mod decompression;
pub mod error;
pub mod error_sink;
pub mod join;
pub mod normalize;
pub mod parsers;
pub mod pipeline;
pub mod platform;
pub mod readers;
pub mod schema;
pub mod sink;
pub mod stats;
pub mod timestamp;
pub mod warehouse;

pub use config::{JoinKind, ParquetCompression, PipelineConfig, WriteMode};
pub use dataset::{DataFile, Dataset};
pub use error::{PipelineError, Result};
pub use join::{join, JoinedTable, SideTable};
pub use normalize::{normalize, NormalizedRecord};
pub use parsers::{parse, AccessLogParser, LineParser, ParsedRecord};
pub use pipeline::{run_pipeline, PipelineOutcome};
pub use readers::{read, LineReader};
pub use schema::Column;
pub use sink::{write, ChunkedWriter};
pub use warehouse::Warehouse;
