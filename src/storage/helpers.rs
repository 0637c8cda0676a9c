//! Shared storage helper functions.
//!
//! Conversions between domain values and their stored representations,
//! used across storage backend implementations.

use chrono::SecondsFormat;

use super::{Result, StorageError};
use crate::model::Timestamp;

/// Format a timestamp for storage.
///
/// Fixed microsecond precision keeps the stored text stable, so a value read
/// back and formatted again compares equal in guarded updates.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC3339 timestamp.
pub fn parse_timestamp(value: &str) -> Result<Timestamp> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| StorageError::InvalidTimestamp(format!("{value}: {e}")))
}

/// Convert a point amount to the store's signed 64-bit column type.
pub fn points_to_db(points: u64) -> Result<i64> {
    i64::try_from(points).map_err(|_| StorageError::ValueOutOfRange { field: "points" })
}

/// Convert a stored point amount back to `u64`.
pub fn points_from_db(value: i64, field: &'static str) -> Result<u64> {
    u64::try_from(value).map_err(|_| StorageError::ValueOutOfRange { field })
}
