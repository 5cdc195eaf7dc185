//! Interval matching between bucket epochs and a requested window.

use crate::error::RestoreError;
use crate::types::{Bucket, TimeWindow};
use std::fmt::Write as _;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Date format accepted on the command line.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// True if any part of the bucket's span intersects the window, boundaries included.
pub fn overlaps(bucket: &Bucket, window: &TimeWindow) -> bool {
    bucket.newest_epoch >= window.oldest && bucket.oldest_epoch <= window.newest
}

/// Converts a `YYYY-MM-DD HH:MM:SS` string (UTC) to a Unix epoch.
pub fn parse_date_time(value: &str) -> Result<i64, RestoreError> {
    let invalid = |reason: String| {
        RestoreError::Config(format!(
            "Invalid date '{}'. Expected format: '{}' ({})",
            value, DATE_FORMAT, reason
        ))
    };

    let trimmed = value.trim();
    // parse_rfc3339_weak also takes fractional seconds; the CLI contract does not
    if trimmed.len() != 19 {
        return Err(invalid("wrong length".to_string()));
    }
    let time = humantime::parse_rfc3339_weak(trimmed).map_err(|e| invalid(e.to_string()))?;
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map_err(|e| invalid(e.to_string()))?
        .as_secs();
    Ok(secs as i64)
}

/// Formats an epoch for display.
///
/// Values RFC3339 cannot express (before 1970 or after year 9999, such as
/// millisecond stamps) are shown raw.
pub fn format_epoch(epoch: i64) -> String {
    let Ok(secs) = u64::try_from(epoch) else {
        return epoch.to_string();
    };
    let Some(time) = UNIX_EPOCH.checked_add(Duration::from_secs(secs)) else {
        return epoch.to_string();
    };
    let mut formatted = String::new();
    if write!(formatted, "{}", humantime::format_rfc3339_seconds(time)).is_err() {
        return epoch.to_string();
    }
    formatted.replace('T', " ").trim_end_matches('Z').to_string()
}

/// Current time as a Unix epoch.
pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
