use arrow::array::{ArrayRef, Int64Builder, StringBuilder, TimestampMicrosecondBuilder};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use crate::error::Result;
use crate::normalize::NormalizedRecord;

/// Why a record could not be stored in the columnar schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeError {
    pub field: &'static str,
    pub value: u64,
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} value {} does not fit in a signed 64-bit column", self.field, self.value)
    }
}

fn to_i64(field: &'static str, value: u64) -> Result<i64, EncodeError> {
    i64::try_from(value).map_err(|_| EncodeError { field, value })
}

/// Column builders for one batch (or one partition of a batch).
pub struct BatchEncoder {
    schema: SchemaRef,
    host: StringBuilder,
    referrer: StringBuilder,
    user: StringBuilder,
    datetime: TimestampMicrosecondBuilder,
    method: StringBuilder,
    request: StringBuilder,
    proto: StringBuilder,
    status: Int64Builder,
    bytes: Int64Builder,
    http_referred: StringBuilder,
    user_agent: StringBuilder,
    rows: usize,
}

impl BatchEncoder {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            host: StringBuilder::new(),
            referrer: StringBuilder::new(),
            user: StringBuilder::new(),
            datetime: TimestampMicrosecondBuilder::new().with_timezone("UTC"),
            method: StringBuilder::new(),
            request: StringBuilder::new(),
            proto: StringBuilder::new(),
            status: Int64Builder::new(),
            bytes: Int64Builder::new(),
            http_referred: StringBuilder::new(),
            user_agent: StringBuilder::new(),
            rows: 0,
        }
    }

    /// Append one record. Checked before any builder is touched, so a
    /// rejected record leaves the columns aligned.
    pub fn append(&mut self, record: &NormalizedRecord) -> Result<(), EncodeError> {
        let status = to_i64("status", record.status)?;
        let bytes = to_i64("bytes", record.bytes)?;

        self.host.append_value(&record.host);
        self.referrer.append_value(&record.referrer);
        self.user.append_value(&record.user);
        self.datetime.append_value(record.datetime.timestamp_micros());
        self.method.append_value(&record.method);
        self.request.append_value(&record.request);
        self.proto.append_value(&record.proto);
        self.status.append_value(status);
        self.bytes.append_value(bytes);
        self.http_referred.append_value(&record.http_referred);
        self.user_agent.append_value(&record.user_agent);
        self.rows += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn finish(mut self) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(self.host.finish()),
            Arc::new(self.referrer.finish()),
            Arc::new(self.user.finish()),
            Arc::new(self.datetime.finish()),
            Arc::new(self.method.finish()),
            Arc::new(self.request.finish()),
            Arc::new(self.proto.finish()),
            Arc::new(self.status.finish()),
            Arc::new(self.bytes.finish()),
            Arc::new(self.http_referred.finish()),
            Arc::new(self.user_agent.finish()),
        ];
        Ok(RecordBatch::try_new(self.schema, columns)?)
    }
}
