//! Column definitions shared by the writer, the dataset reader and the join.

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The eleven fields captured from an access log line, in grammar order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Host,
    Referrer,
    User,
    Datetime,
    Method,
    Request,
    Proto,
    Status,
    Bytes,
    HttpReferred,
    UserAgent,
}

impl Column {
    pub const ALL: [Column; 11] = [
        Column::Host,
        Column::Referrer,
        Column::User,
        Column::Datetime,
        Column::Method,
        Column::Request,
        Column::Proto,
        Column::Status,
        Column::Bytes,
        Column::HttpReferred,
        Column::UserAgent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::Host => "host",
            Column::Referrer => "referrer",
            Column::User => "user",
            Column::Datetime => "datetime",
            Column::Method => "method",
            Column::Request => "request",
            Column::Proto => "proto",
            Column::Status => "status",
            Column::Bytes => "bytes",
            Column::HttpReferred => "http_referred",
            Column::UserAgent => "user_agent",
        }
    }

    /// Position of the column in [`record_schema`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn data_type(self) -> DataType {
        match self {
            Column::Datetime => timestamp_type(),
            Column::Status | Column::Bytes => DataType::Int64,
            _ => DataType::Utf8,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Column::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Column::ALL.iter().map(|c| c.name()).collect();
                format!("unknown column '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

pub fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
}

/// Schema of every dataset file: all eleven normalized fields, none nullable.
pub fn record_schema() -> SchemaRef {
    Arc::new(Schema::new(
        Column::ALL
            .iter()
            .map(|c| Field::new(c.name(), c.data_type(), false))
            .collect::<Vec<_>>(),
    ))
}

/// Columns of the dataset carried into the warehouse table, in output order.
pub const PROJECTED_COLUMNS: [Column; 6] = [
    Column::Host,
    Column::Datetime,
    Column::Method,
    Column::Request,
    Column::Status,
    Column::Bytes,
];

pub const HOSTNAME_COLUMN: &str = "hostname";

/// Schema of the joined, warehouse-bound table.
///
/// `hostname` is nullable so that a left join can keep unmatched hosts.
pub fn joined_schema() -> SchemaRef {
    let mut fields: Vec<Field> = PROJECTED_COLUMNS
        .iter()
        .map(|c| Field::new(c.name(), c.data_type(), false))
        .collect();
    fields.push(Field::new(HOSTNAME_COLUMN, DataType::Utf8, true));
    Arc::new(Schema::new(fields))
}
