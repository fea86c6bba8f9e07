//! Reserved bookkeeping tables.
//!
//! Sync state (queued batches, table cursors, the cached schema) lives
//! in ordinary tables of the same storage engine as the data, injected
//! into the schema at prepare time. They are never part of a sync scope.

use tablesync_core::{ColumnKind, Schema, TableSchema};

/// Durable FIFO of pending change batches.
pub const CHANGE_QUEUE_TABLE: &str = "sync_change_queue";
/// Per-table download cursor.
pub const TABLE_VERSION_TABLE: &str = "sync_table_version";
/// Cached server schema blob.
pub const SCHEMA_CACHE_TABLE: &str = "sync_schema_cache";

/// True for the reserved bookkeeping tables.
pub fn is_meta_table(table: &str) -> bool {
    matches!(
        table,
        CHANGE_QUEUE_TABLE | TABLE_VERSION_TABLE | SCHEMA_CACHE_TABLE
    )
}

/// Returns the schema with the bookkeeping tables injected.
pub fn with_meta_tables(mut schema: Schema) -> Schema {
    if !schema.tables.contains_key(CHANGE_QUEUE_TABLE) {
        schema = schema.with_table(
            TableSchema::new(
                CHANGE_QUEUE_TABLE,
                &["batch_id"],
                &["batch_id", "seq", "created_at", "payload"],
            )
            .with_column_kind("payload", ColumnKind::Json),
        );
    }
    if !schema.tables.contains_key(TABLE_VERSION_TABLE) {
        schema = schema.with_table(TableSchema::new(
            TABLE_VERSION_TABLE,
            &["table_name"],
            &["table_name", "version"],
        ));
    }
    if !schema.tables.contains_key(SCHEMA_CACHE_TABLE) {
        schema = schema.with_table(
            TableSchema::new(
                SCHEMA_CACHE_TABLE,
                &["cache_key"],
                &["cache_key", "version", "payload"],
            )
            .with_column_kind("payload", ColumnKind::Json),
        );
    }
    schema
}
