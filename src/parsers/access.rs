use regex::{Captures, Regex};

use super::{LineParser, ParsedRecord};

// host ident user [datetime] "method request proto" status bytes "referrer" "user_agent"
// Example: 10.0.0.1 - - [22/Jan/2019:03:56:14 +0330] "GET /index.html HTTP/1.1" 200 512 "-" "curl/7.68.0"
const ACCESS_LINE_PATTERN: &str =
    r#"^(\S+) (\S+) (\S+) \[(.*?)\] "(\S+) (\S+) (\S+)" (\S+) (\S+) "(.*?)" "(.*?)""#;

/// Parser for the combined access log layout.
///
/// The match is anchored at the start of the line only, so trailing fields
/// some servers append (request time, upstream address) are ignored.
#[derive(Debug, Clone)]
pub struct AccessLogParser {
    regex: Regex,
}

impl AccessLogParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(ACCESS_LINE_PATTERN)?,
        })
    }

    fn group(captures: &Captures<'_>, index: usize) -> String {
        captures
            .get(index)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }
}

impl LineParser for AccessLogParser {
    fn parse(&self, line: &str) -> Option<ParsedRecord> {
        let captures = self.regex.captures(line)?;
        Some(ParsedRecord {
            host: Self::group(&captures, 1),
            referrer: Self::group(&captures, 2),
            user: Self::group(&captures, 3),
            datetime: Self::group(&captures, 4),
            method: Self::group(&captures, 5),
            request: Self::group(&captures, 6),
            proto: Self::group(&captures, 7),
            status: Self::group(&captures, 8),
            bytes: Self::group(&captures, 9),
            http_referred: Self::group(&captures, 10),
            user_agent: Self::group(&captures, 11),
        })
    }
}
