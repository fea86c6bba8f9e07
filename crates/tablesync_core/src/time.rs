//! Millisecond clock helper.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time as milliseconds since the Unix epoch.
///
/// All timestamps in the data model (record modification dates, batch
/// creation dates, binary creation dates) use this representation so they
/// can be compared across peers once clock skew has been calibrated out.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
