//! Shared utility functions

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Timestamp format used in audit lines.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a UTC instant the way audit lines carry it.
///
/// # Examples
///
/// ```
/// use chrono::TimeZone;
/// use tierward_server::util::format_timestamp;
///
/// let at = chrono::Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
/// assert_eq!(format_timestamp(at), "2026-10-19 08:30:00");
/// ```
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp produced by [`format_timestamp`].
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Replace `path` with `contents` without leaving a half-written file.
///
/// Writes to a sibling temp file, syncs it, then renames over the target.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}
