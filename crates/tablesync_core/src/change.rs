//! Change entries, atomic change batches, and tombstones.

use crate::record::Record;
use crate::time::now_millis;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One local mutation, part of a [`ChangeBatch`].
///
/// `Auto` resolves to insert-or-update at apply time based on primary-key
/// existence in the target store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ChangeEntry {
    /// Insert a new record.
    Insert {
        /// Target table.
        table: String,
        /// The record to insert.
        record: Record,
    },
    /// Merge into an existing record.
    Update {
        /// Target table.
        table: String,
        /// Columns to merge; must carry the primary key.
        record: Record,
    },
    /// Remove one record by primary key.
    Remove {
        /// Target table.
        table: String,
        /// A record carrying at least the primary key columns.
        record: Record,
    },
    /// Remove every record matching a condition.
    #[serde(rename = "removeWhere")]
    RemoveWhere {
        /// Target table.
        table: String,
        /// Declarative condition in its JSON form.
        condition: Value,
    },
    /// Insert or update depending on whether the primary key exists.
    Auto {
        /// Target table.
        table: String,
        /// The record to upsert.
        record: Record,
    },
}

impl ChangeEntry {
    /// Returns the table this entry targets.
    pub fn table(&self) -> &str {
        match self {
            ChangeEntry::Insert { table, .. }
            | ChangeEntry::Update { table, .. }
            | ChangeEntry::Remove { table, .. }
            | ChangeEntry::RemoveWhere { table, .. }
            | ChangeEntry::Auto { table, .. } => table,
        }
    }
}

/// An ordered group of mutations applied atomically.
///
/// Batches are persisted to the change queue before any network attempt
/// and removed only after server acknowledgment, making upload retries
/// safe (the server deduplicates by the random batch id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    /// Random id, generated locally; never derived from content so that
    /// retried uploads of the same batch are recognizable.
    pub id: Uuid,
    /// Creation time in local milliseconds.
    pub created_at: i64,
    /// Clock-skew estimate (milliseconds) stamped at upload time so the
    /// server can place the batch on its own timeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_skew: Option<i64>,
    /// The mutations, in application order.
    pub entries: Vec<ChangeEntry>,
}

impl ChangeBatch {
    /// Creates a batch from entries, assigning a fresh random id.
    pub fn new(entries: Vec<ChangeEntry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now_millis(),
            clock_skew: None,
            entries,
        }
    }

    /// Returns the distinct tables touched by this batch, in first-seen order.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !tables.contains(&entry.table()) {
                tables.push(entry.table());
            }
        }
        tables
    }

    /// Returns true if the batch holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A retained record of a server-side deletion.
///
/// Consumed by clients whose table cursor predates the deletion so they
/// can replicate the removal locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Table the record was removed from.
    pub table: String,
    /// Ordered primary key values of the removed record.
    pub pk: Vec<Value>,
    /// Table version at the time of deletion.
    pub table_version: i64,
}
