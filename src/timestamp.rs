use chrono::{DateTime, Datelike, Utc};

/// Access log timestamp layout, e.g. `22/Jan/2019:03:56:14 +0330`
pub const ACCESS_LOG_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// 1900-01-01T00:00:00Z as seconds relative to the Unix epoch
const SENTINEL_EPOCH_SECS: i64 = -2_208_988_800;

/// Timestamp recorded when a line's datetime is empty or unreadable.
pub fn sentinel_timestamp() -> DateTime<Utc> {
    DateTime::from_timestamp(SENTINEL_EPOCH_SECS, 0).unwrap_or_default()
}

pub fn is_sentinel(ts: &DateTime<Utc>) -> bool {
    ts.timestamp() == SENTINEL_EPOCH_SECS && ts.year() == 1900
}

/// Parse an access log timestamp, converting its offset to UTC.
pub fn parse_access_timestamp(ts_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = ts_str.trim();
    if trimmed.is_empty() {
        return None;
    }
    DateTime::parse_from_str(trimmed, ACCESS_LOG_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse, falling back to [`sentinel_timestamp`] for empty or malformed input.
pub fn parse_or_sentinel(ts_str: &str) -> DateTime<Utc> {
    parse_access_timestamp(ts_str).unwrap_or_else(sentinel_timestamp)
}
