//! Persisted copy of the last schema accepted from the server.

use crate::error::{SyncError, SyncResult};
use crate::meta::SCHEMA_CACHE_TABLE;
use serde_json::{json, Value};
use std::sync::Arc;
use tablesync_core::{ChangeEntry, Schema};
use tablesync_store::StorageEngine;

const CACHE_KEY: &str = "schema";

/// Stores the server schema blob in a reserved table so a reloaded
/// client starts from the schema it last synced against.
pub struct SchemaCache<S> {
    store: Arc<S>,
}

impl<S: StorageEngine> SchemaCache<S> {
    /// A cache persisting through the given engine.
    pub fn new(store: Arc<S>) -> Self {
        SchemaCache { store }
    }

    /// The cached schema, if any.
    ///
    /// # Errors
    ///
    /// Fails when the cached blob cannot be decoded.
    pub fn load(&self) -> SyncResult<Option<Schema>> {
        let row = self.store.get_by_pk(SCHEMA_CACHE_TABLE, &json!(CACHE_KEY), None)?;
        match row {
            None => Ok(None),
            Some(record) => {
                let payload = record.get("payload").cloned().unwrap_or(Value::Null);
                let schema = serde_json::from_value(payload).map_err(|err| {
                    SyncError::schema_unavailable(format!("corrupt cached schema: {err}"))
                })?;
                Ok(Some(schema))
            }
        }
    }

    /// Persists a schema as the cached copy.
    ///
    /// # Errors
    ///
    /// Fails when the blob cannot be serialized or written.
    pub fn store(&self, schema: &Schema) -> SyncResult<()> {
        let payload =
            serde_json::to_value(schema).map_err(|err| SyncError::storage(err.to_string()))?;
        let record = json!({
            "cache_key": CACHE_KEY,
            "version": schema.version,
            "payload": payload,
        });
        let record = record.as_object().cloned().unwrap_or_default();
        self.store.transactional_changes(vec![ChangeEntry::Auto {
            table: SCHEMA_CACHE_TABLE.into(),
            record,
        }])?;
        tracing::debug!(version = schema.version, "schema cached");
        Ok(())
    }
}
