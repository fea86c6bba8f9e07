//! Durable FIFO of pending change batches.

use crate::error::{SyncError, SyncResult};
use crate::meta::CHANGE_QUEUE_TABLE;
use serde_json::{json, Value};
use std::sync::Arc;
use tablesync_core::ChangeBatch;
use tablesync_store::{QueryOptions, StorageEngine};

/// Persists queued batches through the storage engine so pending uploads
/// survive a reload.
///
/// A batch is durable before `enqueue` returns and is removed only after
/// the caller confirms the server acknowledged it.
pub struct ChangeQueue<S> {
    store: Arc<S>,
}

impl<S: StorageEngine> ChangeQueue<S> {
    /// A queue persisting through the given engine.
    pub fn new(store: Arc<S>) -> Self {
        ChangeQueue { store }
    }

    /// Appends a batch at the tail.
    ///
    /// # Errors
    ///
    /// Fails when the batch cannot be serialized or persisted.
    pub fn enqueue(&self, batch: &ChangeBatch) -> SyncResult<()> {
        let payload =
            serde_json::to_value(batch).map_err(|err| SyncError::storage(err.to_string()))?;
        let seq = self.tail_seq()? + 1;
        let row = json!({
            "batch_id": batch.id.to_string(),
            "seq": seq,
            "created_at": batch.created_at,
            "payload": payload,
        });
        let record = row
            .as_object()
            .cloned()
            .ok_or_else(|| SyncError::storage("queue row must be an object"))?;
        self.store.insert(CHANGE_QUEUE_TABLE, record)?;
        tracing::debug!(batch = %batch.id, entries = batch.entries.len(), "batch queued");
        Ok(())
    }

    /// Returns the oldest batch without removing it.
    ///
    /// # Errors
    ///
    /// Fails when a persisted row cannot be decoded back into a batch.
    pub fn peek_oldest(&self) -> SyncResult<Option<ChangeBatch>> {
        let row = self.store.search_first(
            CHANGE_QUEUE_TABLE,
            &Value::Null,
            &QueryOptions {
                order_by: Some("seq".into()),
                ..QueryOptions::default()
            },
        )?;
        match row {
            None => Ok(None),
            Some(record) => {
                let payload = record.get("payload").cloned().unwrap_or(Value::Null);
                let batch = serde_json::from_value(payload)
                    .map_err(|err| SyncError::storage(format!("corrupt queued batch: {err}")))?;
                Ok(Some(batch))
            }
        }
    }

    /// Removes the oldest batch, after server acknowledgment.
    ///
    /// # Errors
    ///
    /// Fails when the queue table cannot be read or written.
    pub fn remove_oldest(&self) -> SyncResult<()> {
        if let Some(batch) = self.peek_oldest()? {
            self.store
                .remove(CHANGE_QUEUE_TABLE, &json!(batch.id.to_string()))?;
        }
        Ok(())
    }

    /// Number of batches waiting for upload.
    ///
    /// # Errors
    ///
    /// Fails when the queue table cannot be read.
    pub fn pending(&self) -> SyncResult<usize> {
        Ok(self
            .store
            .search(CHANGE_QUEUE_TABLE, &Value::Null, &QueryOptions::default())?
            .len())
    }

    fn tail_seq(&self) -> SyncResult<i64> {
        let row = self.store.search_first(
            CHANGE_QUEUE_TABLE,
            &Value::Null,
            &QueryOptions {
                order_by: Some("seq desc".into()),
                ..QueryOptions::default()
            },
        )?;
        Ok(row
            .and_then(|r| r.get("seq").and_then(Value::as_i64))
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::with_meta_tables;
    use tablesync_core::{ChangeEntry, Schema};
    use tablesync_store::{MemoryEngine, PrepareOptions};

    fn store() -> Arc<MemoryEngine> {
        let engine = MemoryEngine::new();
        engine
            .prepare(PrepareOptions {
                namespace: "acct".into(),
                schema: with_meta_tables(Schema::new(1)),
            })
            .unwrap();
        Arc::new(engine)
    }

    fn batch(table: &str) -> ChangeBatch {
        ChangeBatch::new(vec![ChangeEntry::Insert {
            table: table.into(),
            record: serde_json::from_value(json!({"uid": table})).unwrap(),
        }])
    }

    #[test]
    fn fifo_order_survives_same_timestamp() {
        let store = store();
        let queue = ChangeQueue::new(store);
        let first = batch("a");
        let second = batch("b");
        queue.enqueue(&first).unwrap();
        queue.enqueue(&second).unwrap();

        assert_eq!(queue.pending().unwrap(), 2);
        assert_eq!(queue.peek_oldest().unwrap().unwrap().id, first.id);
        queue.remove_oldest().unwrap();
        assert_eq!(queue.peek_oldest().unwrap().unwrap().id, second.id);
        queue.remove_oldest().unwrap();
        assert!(queue.peek_oldest().unwrap().is_none());
    }

    #[test]
    fn queued_batches_round_trip_through_another_handle() {
        let store = store();
        let queue = ChangeQueue::new(Arc::clone(&store));
        let original = batch("a");
        queue.enqueue(&original).unwrap();

        // A fresh queue over the same engine sees the identical batch.
        let reopened = ChangeQueue::new(store);
        assert_eq!(reopened.peek_oldest().unwrap().unwrap(), original);
    }

    #[test]
    fn peek_does_not_remove() {
        let queue = ChangeQueue::new(store());
        queue.enqueue(&batch("a")).unwrap();
        queue.peek_oldest().unwrap();
        assert_eq!(queue.pending().unwrap(), 1);
    }
}
