#![no_main]

use std::path::Path;
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use loglake::normalize::normalize_record;
use loglake::parsers::{AccessLogParser, LineParser, ParsedLine};
use loglake::readers::LineOrigin;

const MAX_LINE_LEN: usize = 4096;

fuzz_target!(|data: &[u8]| {
    if data.len() > MAX_LINE_LEN {
        return;
    }
    let line = String::from_utf8_lossy(data);
    let Ok(parser) = AccessLogParser::new() else {
        return;
    };

    let Some(record) = parser.parse(&line) else {
        return;
    };

    // A matched line always yields either a record or a coercion error, never a panic
    let parsed = ParsedLine {
        origin: LineOrigin {
            path: Arc::from(Path::new("fuzz.log")),
            line_number: 1,
        },
        record: record.clone(),
    };
    match normalize_record(parsed, 1) {
        Ok(normalized) => {
            assert_eq!(normalized.host, record.host);
            if record.bytes == "-" {
                assert_eq!(normalized.bytes, 0);
            }
        }
        Err(e) => {
            let message = e.to_string();
            assert!(message.contains("bytes") || message.contains("status"));
        }
    }
});
