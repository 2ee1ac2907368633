//! Hostname enrichment of the written dataset.
//!
//! The side file is a CSV table with at least `client` and `hostname`
//! columns. Each dataset row is matched on `host == client`; a client listed
//! more than once produces one output row per listing.

use arrow::array::{ArrayRef, AsArray, StringArray, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::JoinKind;
use crate::dataset::{Dataset, DatasetScan};
use crate::error::{PipelineError, Result};
use crate::schema::{joined_schema, Column, PROJECTED_COLUMNS};
use crate::stats::stats_add_join;

const CLIENT_COLUMN: &str = "client";
const SIDE_HOSTNAME_COLUMN: &str = "hostname";

/// client -> hostnames, in side-file order
#[derive(Debug, Default)]
pub struct SideTable {
    hostnames: HashMap<String, Vec<String>>,
    rows: usize,
}

impl SideTable {
    pub fn load(path: &Path) -> Result<Self> {
        let side_error = |source: csv::Error| PipelineError::SideFile {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::Reader::from_path(path).map_err(side_error)?;
        let headers = reader.headers().map_err(side_error)?.clone();
        let position = |name: &str| {
            headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
                PipelineError::Schema(format!(
                    "side file {} has no '{}' column",
                    path.display(),
                    name
                ))
            })
        };
        let client_idx = position(CLIENT_COLUMN)?;
        let hostname_idx = position(SIDE_HOSTNAME_COLUMN)?;

        let mut table = Self::default();
        for row in reader.records() {
            let row = row.map_err(side_error)?;
            let (Some(client), Some(hostname)) = (row.get(client_idx), row.get(hostname_idx)) else {
                continue;
            };
            table
                .hostnames
                .entry(client.to_string())
                .or_default()
                .push(hostname.to_string());
            table.rows += 1;
        }
        Ok(table)
    }

    pub fn lookup(&self, client: &str) -> &[String] {
        self.hostnames.get(client).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

fn check_columns(schema: &SchemaRef) -> Result<()> {
    for column in PROJECTED_COLUMNS {
        if schema.index_of(column.name()).is_err() {
            return Err(PipelineError::Schema(format!(
                "dataset has no '{}' column",
                column
            )));
        }
    }
    Ok(())
}

/// Join one dataset batch; returns the joined batch and the unmatched row count.
fn join_batch(batch: &RecordBatch, side: &SideTable, kind: JoinKind) -> Result<(RecordBatch, usize)> {
    let hosts = batch
        .column_by_name(Column::Host.name())
        .and_then(|c| c.as_string_opt::<i32>())
        .ok_or_else(|| PipelineError::Schema("dataset 'host' column is not a string column".to_string()))?;

    let mut indices: Vec<u32> = Vec::with_capacity(batch.num_rows());
    let mut hostnames: Vec<Option<&str>> = Vec::with_capacity(batch.num_rows());
    let mut unmatched = 0;
    for (row, host) in hosts.iter().enumerate() {
        let matches = host.map(|h| side.lookup(h)).unwrap_or_default();
        if matches.is_empty() {
            unmatched += 1;
            if kind == JoinKind::Left {
                indices.push(row as u32);
                hostnames.push(None);
            }
            continue;
        }
        for hostname in matches {
            indices.push(row as u32);
            hostnames.push(Some(hostname.as_str()));
        }
    }

    let indices = UInt32Array::from(indices);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(PROJECTED_COLUMNS.len() + 1);
    for column in PROJECTED_COLUMNS {
        let values = batch
            .column_by_name(column.name())
            .ok_or_else(|| PipelineError::Schema(format!("dataset has no '{}' column", column)))?;
        columns.push(take(values.as_ref(), &indices, None)?);
    }
    columns.push(Arc::new(StringArray::from(hostnames)));

    Ok((RecordBatch::try_new(joined_schema(), columns)?, unmatched))
}

/// A dataset paired with its loaded side table.
///
/// Rows are produced batch by batch from [`JoinedTable::batches`], so the
/// joined result is never held in memory as a whole.
#[derive(Debug)]
pub struct JoinedTable<'a> {
    dataset: &'a Dataset,
    side: SideTable,
    kind: JoinKind,
}

/// Join the dataset against the hostname side file.
///
/// Output columns are `host, datetime, method, request, status, bytes,
/// hostname`. Row order follows the dataset scan. Missing columns on either
/// side are reported here, before any row is produced.
pub fn join<'a>(dataset: &'a Dataset, side_file: &Path, kind: JoinKind) -> Result<JoinedTable<'a>> {
    check_columns(&dataset.schema())?;
    let side = SideTable::load(side_file)?;
    info!(
        kind = ?kind,
        side_rows = side.len(),
        path = %side_file.display(),
        "loaded hostname side file"
    );
    Ok(JoinedTable { dataset, side, kind })
}

impl JoinedTable<'_> {
    pub fn schema(&self) -> SchemaRef {
        joined_schema()
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    pub fn batches(&self) -> JoinedBatches<'_> {
        JoinedBatches {
            scan: self.dataset.scan(),
            side: &self.side,
            kind: self.kind,
            finished: false,
        }
    }

    /// Materialize every joined batch
    pub fn collect(&self) -> Result<Vec<RecordBatch>> {
        self.batches().collect()
    }
}

pub struct JoinedBatches<'a> {
    scan: DatasetScan,
    side: &'a SideTable,
    kind: JoinKind,
    finished: bool,
}

impl Iterator for JoinedBatches<'_> {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let result = match self.scan.next() {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(batch) => batch.and_then(|b| join_batch(&b, self.side, self.kind)),
            };

            match result {
                Ok((joined, unmatched)) => {
                    stats_add_join(joined.num_rows(), unmatched);
                    if joined.num_rows() > 0 {
                        return Some(Ok(joined));
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
