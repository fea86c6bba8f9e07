//! Per-table download cursors.

use crate::error::SyncResult;
use crate::meta::TABLE_VERSION_TABLE;
use serde_json::{json, Value};
use std::sync::Arc;
use tablesync_core::ChangeEntry;
use tablesync_store::StorageEngine;

/// Tracks, per table, the highest server table version already applied
/// locally. `-1` means the table was never synced (or is marked for a
/// forced full refresh).
pub struct VersionTracker<S> {
    store: Arc<S>,
}

impl<S: StorageEngine> VersionTracker<S> {
    /// A tracker persisting through the given engine.
    pub fn new(store: Arc<S>) -> Self {
        VersionTracker { store }
    }

    /// The cursor of a table; `-1` when unknown.
    ///
    /// # Errors
    ///
    /// Fails when the cursor table cannot be read.
    pub fn version_of(&self, table: &str) -> SyncResult<i64> {
        let row = self.store.get_by_pk(TABLE_VERSION_TABLE, &json!(table), None)?;
        Ok(row
            .and_then(|r| r.get("version").and_then(Value::as_i64))
            .unwrap_or(-1))
    }

    /// Moves the cursor forward; lower or equal versions are ignored so
    /// the cursor never regresses.
    ///
    /// # Errors
    ///
    /// Fails when the cursor row cannot be written.
    pub fn advance(&self, table: &str, version: i64) -> SyncResult<()> {
        if version <= self.version_of(table)? {
            return Ok(());
        }
        self.set(table, version)
    }

    /// Marks the table for a full refetch on the next cycle.
    ///
    /// # Errors
    ///
    /// Fails when the cursor row cannot be written.
    pub fn force_refresh(&self, table: &str) -> SyncResult<()> {
        tracing::debug!(table, "table marked for forced refresh");
        self.set(table, -1)
    }

    fn set(&self, table: &str, version: i64) -> SyncResult<()> {
        let record = json!({"table_name": table, "version": version});
        let record = record
            .as_object()
            .cloned()
            .unwrap_or_default();
        self.store.transactional_changes(vec![ChangeEntry::Auto {
            table: TABLE_VERSION_TABLE.into(),
            record,
        }])?;
        Ok(())
    }
}
