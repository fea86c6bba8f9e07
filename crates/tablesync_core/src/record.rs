//! Records and engine-owned revision fields.

use serde_json::{Map, Value};

/// A single row: column name to JSON value.
///
/// Records are open maps rather than typed structs because the schema is
/// only known at runtime (it is fetched from the server and may change
/// between sync cycles).
pub type Record = Map<String, Value>;

/// Engine-owned column holding the monotonic per-record revision counter.
///
/// Never set by callers; starts at 0 on insert and advances by exactly
/// one per update.
pub const ROW_VERSION: &str = "row_version";

/// Engine-owned column holding the last-modification timestamp in
/// milliseconds since the Unix epoch.
pub const ROW_MODIFIED: &str = "row_modified";

/// Server-stamped column carrying the table version a downloaded row was
/// observed at. Basis for delta sync; never written by local mutations.
pub const TABLE_VERSION: &str = "table_version";

/// Stamps a freshly inserted record: revision 0, modification time `now_ms`.
pub fn stamp_insert(record: &mut Record, now_ms: i64) {
    record.insert(ROW_VERSION.to_string(), Value::from(0));
    record.insert(ROW_MODIFIED.to_string(), Value::from(now_ms));
}

/// Stamps an updated record: revision +1 over the stored revision,
/// modification time `now_ms`.
///
/// `stored_revision` is the revision of the record currently in the store;
/// callers must read it back rather than trust the incoming record so that
/// the +1 invariant holds even for stale client copies.
pub fn stamp_update(record: &mut Record, stored_revision: i64, now_ms: i64) {
    record.insert(ROW_VERSION.to_string(), Value::from(stored_revision + 1));
    record.insert(ROW_MODIFIED.to_string(), Value::from(now_ms));
}

/// Returns the revision counter of a record, or 0 when unset.
pub fn revision_of(record: &Record) -> i64 {
    record.get(ROW_VERSION).and_then(Value::as_i64).unwrap_or(0)
}

/// Returns a column value, treating JSON null as absent.
pub fn record_value<'a>(record: &'a Record, column: &str) -> Option<&'a Value> {
    match record.get(column) {
        Some(Value::Null) | None => None,
        Some(v) => Some(v),
    }
}
