//! Shared utility functions

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
#[inline]
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Format a millisecond timestamp as RFC 3339 (UTC), or the raw number if it
/// is out of range
pub fn format_timestamp_millis(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| timestamp.to_string())
}
