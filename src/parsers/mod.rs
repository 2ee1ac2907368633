pub mod access;

pub use access::AccessLogParser;

use tracing::trace;

use crate::error::Result;
use crate::error_sink::ErrorSink;
use crate::readers::{LineOrigin, SourceLine};
use crate::schema::Column;
use crate::stats::{stats_add_malformed_line, stats_add_record_parsed};

/// Fields captured from one access log line, exactly as matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRecord {
    pub host: String,
    pub referrer: String,
    pub user: String,
    pub datetime: String,
    pub method: String,
    pub request: String,
    pub proto: String,
    pub status: String,
    pub bytes: String,
    pub http_referred: String,
    pub user_agent: String,
}

impl ParsedRecord {
    pub fn get(&self, column: Column) -> &str {
        match column {
            Column::Host => &self.host,
            Column::Referrer => &self.referrer,
            Column::User => &self.user,
            Column::Datetime => &self.datetime,
            Column::Method => &self.method,
            Column::Request => &self.request,
            Column::Proto => &self.proto,
            Column::Status => &self.status,
            Column::Bytes => &self.bytes,
            Column::HttpReferred => &self.http_referred,
            Column::UserAgent => &self.user_agent,
        }
    }
}

/// A parsed record together with the input position it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub origin: LineOrigin,
    pub record: ParsedRecord,
}

/// Turns one raw line into a record, or `None` when the grammar rejects it
pub trait LineParser {
    fn parse(&self, line: &str) -> Option<ParsedRecord>;
}

/// Destination for lines the grammar rejects
pub trait MalformedSink {
    fn record(&mut self, line: &SourceLine) -> Result<()>;
}

impl MalformedSink for ErrorSink {
    fn record(&mut self, line: &SourceLine) -> Result<()> {
        ErrorSink::record(self, &line.raw)
    }
}

impl MalformedSink for Vec<String> {
    fn record(&mut self, line: &SourceLine) -> Result<()> {
        self.push(line.text.clone());
        Ok(())
    }
}

/// Lazy parse stage: yields matched records and diverts the rest to a sink.
///
/// Holds no more than the current line. Reader errors are passed through
/// and end the stage.
pub struct ParseStage<'a, I, P, S> {
    lines: I,
    parser: &'a P,
    sink: &'a mut S,
    finished: bool,
}

pub fn parse<'a, I, P, S>(lines: I, parser: &'a P, sink: &'a mut S) -> ParseStage<'a, I::IntoIter, P, S>
where
    I: IntoIterator<Item = Result<SourceLine>>,
    P: LineParser,
    S: MalformedSink,
{
    ParseStage {
        lines: lines.into_iter(),
        parser,
        sink,
        finished: false,
    }
}

impl<I, P, S> Iterator for ParseStage<'_, I, P, S>
where
    I: Iterator<Item = Result<SourceLine>>,
    P: LineParser,
    S: MalformedSink,
{
    type Item = Result<ParsedLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            };

            match self.parser.parse(&line.text) {
                Some(record) => {
                    stats_add_record_parsed();
                    return Some(Ok(ParsedLine {
                        origin: line.origin,
                        record,
                    }));
                }
                None => {
                    stats_add_malformed_line();
                    trace!(origin = %line.origin, "line does not match access log grammar");
                    if let Err(e) = self.sink.record(&line) {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{get_thread_stats, stats_reset};
    use proptest::prelude::*;
    use std::path::Path;
    use std::sync::Arc;

    const GOOD: &str = r#"10.0.0.1 - - [22/Jan/2019:03:56:14 +0330] "GET /a HTTP/1.1" 200 512 "-" "curl""#;

    fn source_lines(texts: &[&str]) -> Vec<Result<SourceLine>> {
        let path: Arc<Path> = Arc::from(Path::new("test.log"));
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                Ok(SourceLine::new(
                    t.as_bytes().to_vec(),
                    LineOrigin {
                        path: Arc::clone(&path),
                        line_number: i + 1,
                    },
                ))
            })
            .collect()
    }

    #[test]
    fn test_malformed_lines_go_to_sink() {
        stats_reset();
        let parser = AccessLogParser::new().unwrap();
        let mut sink: Vec<String> = Vec::new();

        let parsed: Vec<ParsedLine> = parse(source_lines(&[GOOD, "garbage line", GOOD]), &parser, &mut sink)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].origin.line_number, 3);
        assert_eq!(sink, vec!["garbage line".to_string()]);

        let stats = get_thread_stats();
        assert_eq!(stats.records_parsed, 2);
        assert_eq!(stats.malformed_lines, 1);
    }

    #[test]
    fn test_reader_error_ends_stage() {
        let parser = AccessLogParser::new().unwrap();
        let mut sink: Vec<String> = Vec::new();
        let mut lines = source_lines(&[GOOD]);
        lines.push(Err(crate::error::PipelineError::Io {
            path: "x.log".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }));
        lines.extend(source_lines(&[GOOD]));

        let mut stage = parse(lines, &parser, &mut sink);
        assert!(stage.next().unwrap().is_ok());
        assert!(stage.next().unwrap().is_err());
        assert!(stage.next().is_none());
    }

    proptest! {
        #[test]
        fn prop_parsed_plus_malformed_equals_lines(choices in proptest::collection::vec(any::<bool>(), 0..64), junk in "[a-z ]{0,20}") {
            let parser = AccessLogParser::new().unwrap();
            let texts: Vec<&str> = choices.iter().map(|good| if *good { GOOD } else { junk.as_str() }).collect();
            let mut sink: Vec<String> = Vec::new();

            let parsed = parse(source_lines(&texts), &parser, &mut sink).filter(|r| r.is_ok()).count();
            prop_assert_eq!(parsed + sink.len(), texts.len());
            prop_assert_eq!(parsed, choices.iter().filter(|g| **g).count());
        }
    }
}
