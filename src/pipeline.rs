//! End-to-end run: read, parse, normalize, write, join, load.
//!
//! The first four stages are pulled through lazily by the chunked writer, so
//! memory is bounded by one batch. Join and load run once the dataset is
//! complete on disk.

use std::path::PathBuf;
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::error_sink::ErrorSink;
use crate::join::join;
use crate::normalize::normalize;
use crate::parsers::{parse, AccessLogParser};
use crate::readers::read;
use crate::sink;
use crate::stats::{get_thread_stats, stats_finish_processing, ProcessingStats};
use crate::warehouse::Warehouse;

/// What a successful run produced
#[derive(Debug)]
pub struct PipelineOutcome {
    pub dataset: Dataset,
    pub table_name: String,
    pub table_path: PathBuf,
    pub rows_loaded: usize,
    pub malformed_lines: usize,
    pub stats: ProcessingStats,
}

pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineOutcome> {
    info!(
        directory = %config.input.directory.display(),
        pattern = %config.input.pattern,
        destination = %config.output.destination_root.display(),
        chunk_size = config.output.chunk_size,
        "pipeline started"
    );

    let result = run_stages(config);
    stats_finish_processing();

    match &result {
        Ok(outcome) => info!(
            rows_loaded = outcome.rows_loaded,
            malformed_lines = outcome.malformed_lines,
            table = %outcome.table_name,
            "pipeline finished"
        ),
        Err(e) => error!(category = e.category(), "pipeline failed: {}", e),
    }
    result.map(|mut outcome| {
        outcome.stats = get_thread_stats();
        outcome
    })
}

fn run_stages(config: &PipelineConfig) -> Result<PipelineOutcome> {
    let lines = read(&config.input.directory, &config.input.pattern)?;

    let parser = AccessLogParser::new().map_err(|e| PipelineError::Pattern {
        pattern: "access log grammar".to_string(),
        message: e.to_string(),
    })?;
    let mut error_sink = ErrorSink::open(&config.error_file)?;

    let dataset = {
        let records = normalize(parse(lines, &parser, &mut error_sink));
        sink::write(records, &config.output)?
    };
    error_sink.flush()?;
    let malformed_lines = error_sink.lines_written();
    if malformed_lines > 0 {
        info!(
            lines = malformed_lines,
            path = %error_sink.path().display(),
            "recorded malformed lines"
        );
    }

    let joined = join(&dataset, &config.join.side_file, config.join.kind)?;

    let mut warehouse = Warehouse::open(&config.warehouse.directory)?;
    let rows_loaded = warehouse.load(&config.warehouse.table_name, joined.schema(), joined.batches())?;
    let table_path = warehouse.table_path(&config.warehouse.table_name);
    warehouse.close()?;

    Ok(PipelineOutcome {
        dataset,
        table_name: config.warehouse.table_name.clone(),
        table_path,
        rows_loaded,
        malformed_lines,
        stats: ProcessingStats::default(),
    })
}
