//! Typed coercion of parsed records.
//!
//! Coercion policy: `bytes` and `status` must be integers (`bytes` may also be
//! the literal `-`, meaning zero) and a failure stops the run, while an empty
//! or unreadable `datetime` becomes the 1900-01-01 sentinel. Corrupt
//! byte/status counts are data-quality errors worth stopping on, corrupt
//! timestamps are tolerated to keep high-volume ingestion flowing.

use chrono::{DateTime, Utc};

use crate::error::{PipelineError, Result};
use crate::parsers::ParsedLine;
use crate::schema::Column;
use crate::stats::stats_add_record_normalized;
use crate::timestamp::parse_or_sentinel;

/// A parsed record with `status`, `bytes` and `datetime` coerced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub host: String,
    pub referrer: String,
    pub user: String,
    pub datetime: DateTime<Utc>,
    pub method: String,
    pub request: String,
    pub proto: String,
    pub status: u64,
    pub bytes: u64,
    pub http_referred: String,
    pub user_agent: String,
}

impl NormalizedRecord {
    /// Textual form of a column value, as used for partition directory names
    pub fn value_string(&self, column: Column) -> String {
        match column {
            Column::Host => self.host.clone(),
            Column::Referrer => self.referrer.clone(),
            Column::User => self.user.clone(),
            Column::Datetime => self.datetime.to_rfc3339(),
            Column::Method => self.method.clone(),
            Column::Request => self.request.clone(),
            Column::Proto => self.proto.clone(),
            Column::Status => self.status.to_string(),
            Column::Bytes => self.bytes.to_string(),
            Column::HttpReferred => self.http_referred.clone(),
            Column::UserAgent => self.user_agent.clone(),
        }
    }
}

/// Which integer field failed and why, before origin information is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionFailure {
    pub field: &'static str,
    pub value: String,
}

fn parse_count(field: &'static str, value: &str) -> Result<u64, CoercionFailure> {
    value.parse::<u64>().map_err(|_| CoercionFailure {
        field,
        value: value.to_string(),
    })
}

/// `-` means no body was sent
pub fn coerce_bytes(value: &str) -> Result<u64, CoercionFailure> {
    if value == "-" {
        Ok(0)
    } else {
        parse_count("bytes", value)
    }
}

pub fn coerce_status(value: &str) -> Result<u64, CoercionFailure> {
    parse_count("status", value)
}

pub fn coerce_datetime(value: &str) -> DateTime<Utc> {
    parse_or_sentinel(value)
}

/// Coerce one parsed line; `record_index` is its 1-based position in the stream.
pub fn normalize_record(line: ParsedLine, record_index: usize) -> Result<NormalizedRecord> {
    let ParsedLine { origin, record } = line;
    let to_error = |failure: CoercionFailure| PipelineError::Coercion {
        field: failure.field,
        value: failure.value,
        record_index,
        origin: origin.to_string(),
    };

    let bytes = coerce_bytes(&record.bytes).map_err(to_error)?;
    let status = coerce_status(&record.status).map_err(to_error)?;
    let datetime = coerce_datetime(&record.datetime);

    Ok(NormalizedRecord {
        host: record.host,
        referrer: record.referrer,
        user: record.user,
        datetime,
        method: record.method,
        request: record.request,
        proto: record.proto,
        status,
        bytes,
        http_referred: record.http_referred,
        user_agent: record.user_agent,
    })
}

/// Lazy normalize stage preserving stream order; the first error ends it.
pub struct NormalizeStage<I> {
    records: I,
    index: usize,
    finished: bool,
}

pub fn normalize<I>(records: I) -> NormalizeStage<I::IntoIter>
where
    I: IntoIterator<Item = Result<ParsedLine>>,
{
    NormalizeStage {
        records: records.into_iter(),
        index: 0,
        finished: false,
    }
}

impl<I> Iterator for NormalizeStage<I>
where
    I: Iterator<Item = Result<ParsedLine>>,
{
    type Item = Result<NormalizedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let result = match self.records.next() {
            None => {
                self.finished = true;
                return None;
            }
            Some(Err(e)) => Err(e),
            Some(Ok(line)) => {
                self.index += 1;
                normalize_record(line, self.index)
            }
        };

        match result {
            Ok(record) => {
                stats_add_record_normalized();
                Some(Ok(record))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::ParsedRecord;
    use crate::readers::LineOrigin;
    use crate::timestamp::is_sentinel;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::path::Path;
    use std::sync::Arc;

    fn parsed(status: &str, bytes: &str, datetime: &str) -> ParsedLine {
        ParsedLine {
            origin: LineOrigin {
                path: Arc::from(Path::new("access.log")),
                line_number: 4,
            },
            record: ParsedRecord {
                host: "10.0.0.1".to_string(),
                referrer: "-".to_string(),
                user: "-".to_string(),
                datetime: datetime.to_string(),
                method: "GET".to_string(),
                request: "/".to_string(),
                proto: "HTTP/1.1".to_string(),
                status: status.to_string(),
                bytes: bytes.to_string(),
                http_referred: "-".to_string(),
                user_agent: "curl".to_string(),
            },
        }
    }

    #[test]
    fn test_coerce_bytes() {
        assert_eq!(coerce_bytes("-"), Ok(0));
        assert_eq!(coerce_bytes("512"), Ok(512));
        assert_eq!(coerce_bytes("0"), Ok(0));
        assert!(coerce_bytes("abc").is_err());
        assert!(coerce_bytes("").is_err());
        assert!(coerce_bytes("-5").is_err());
        assert!(coerce_bytes("1.5").is_err());
    }

    #[test]
    fn test_coerce_status() {
        assert_eq!(coerce_status("404"), Ok(404));
        let failure = coerce_status("-").unwrap_err();
        assert_eq!(failure.field, "status");
        assert_eq!(failure.value, "-");
    }

    #[test]
    fn test_normalize_record_fields() {
        let record = normalize_record(parsed("200", "-", "22/Jan/2019:03:56:14 +0330"), 1).unwrap();
        assert_eq!(record.status, 200);
        assert_eq!(record.bytes, 0);
        assert_eq!(
            record.datetime,
            Utc.with_ymd_and_hms(2019, 1, 22, 0, 26, 14).unwrap()
        );
        assert_eq!(record.host, "10.0.0.1");
        assert_eq!(record.user_agent, "curl");
    }

    #[test]
    fn test_bad_datetime_is_tolerated() {
        let record = normalize_record(parsed("200", "1", "not a date"), 1).unwrap();
        assert!(is_sentinel(&record.datetime));
        let record = normalize_record(parsed("200", "1", ""), 1).unwrap();
        assert!(is_sentinel(&record.datetime));
    }

    #[test]
    fn test_bad_bytes_is_fatal_with_context() {
        let err = normalize_record(parsed("200", "lots", ""), 9).unwrap_err();
        match err {
            PipelineError::Coercion {
                field,
                value,
                record_index,
                origin,
            } => {
                assert_eq!(field, "bytes");
                assert_eq!(value, "lots");
                assert_eq!(record_index, 9);
                assert_eq!(origin, "access.log:4");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_stage_stops_after_error() {
        let input = vec![
            Ok(parsed("200", "1", "")),
            Ok(parsed("x", "1", "")),
            Ok(parsed("200", "1", "")),
        ];
        let mut stage = normalize(input);
        assert!(stage.next().unwrap().is_ok());
        assert!(matches!(
            stage.next(),
            Some(Err(PipelineError::Coercion { field: "status", record_index: 2, .. }))
        ));
        assert!(stage.next().is_none());
    }

    #[test]
    fn test_stage_preserves_order() {
        let input: Vec<Result<ParsedLine>> = (0..5)
            .map(|i| Ok(parsed("200", &i.to_string(), "")))
            .collect();
        let bytes: Vec<u64> = normalize(input).map(|r| r.unwrap().bytes).collect();
        assert_eq!(bytes, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_value_string() {
        let record = normalize_record(parsed("503", "7", "01/Feb/2020:00:00:00 +0000"), 1).unwrap();
        assert_eq!(record.value_string(Column::Status), "503");
        assert_eq!(record.value_string(Column::Datetime), "2020-02-01T00:00:00+00:00");
    }

    proptest! {
        #[test]
        fn prop_numeric_fields_roundtrip(status in 0u64..1000, bytes in proptest::option::of(0u64..u64::MAX)) {
            let raw_bytes = bytes.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string());
            let record = normalize_record(parsed(&status.to_string(), &raw_bytes, ""), 1).unwrap();
            prop_assert_eq!(record.status, status);
            prop_assert_eq!(record.bytes, bytes.unwrap_or(0));
            prop_assert!(is_sentinel(&record.datetime));
        }

        #[test]
        fn prop_datetime_never_fails(datetime in ".{0,32}") {
            prop_assert!(normalize_record(parsed("200", "1", &datetime), 1).is_ok());
        }
    }
}
