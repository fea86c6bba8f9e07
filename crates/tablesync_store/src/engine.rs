//! The storage engine contract.
//!
//! An engine owns namespaced tables described by a [`Schema`] and exposes
//! the read and write surface the sync layer is built on. Writes go
//! through [`StorageEngine::transactional_changes`] when atomicity across
//! tables matters; reads compose conditions, ordering, pagination and
//! join resolution.

use crate::condition::Condition;
use crate::error::{StoreError, StoreResult};
use crate::join::JoinSpec;
use crate::order::OrderBy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tablesync_core::{ChangeEntry, Record, Schema, TableSchema};

/// Options handed to [`StorageEngine::prepare`].
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    /// Prefix isolating this dataset from others sharing the engine.
    pub namespace: String,
    /// The schema the engine materializes tables for.
    pub schema: Schema,
}

/// Options shaping a search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Related records to resolve and attach.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_fetch: Option<Vec<JoinSpec>>,
    /// Textual order clause, e.g. `"family, name desc"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    /// Records to skip after ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Maximum records to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// One read inside a [`StorageEngine::multiread`] batch.
#[derive(Debug, Clone)]
pub struct ReadSpec {
    /// Key the result is returned under.
    pub name: String,
    /// Table to read from.
    pub table: String,
    /// The read to perform.
    pub op: ReadOp,
}

/// The shape of a batched read.
#[derive(Debug, Clone)]
pub enum ReadOp {
    /// Fetch one record by primary key.
    GetByPk {
        /// The key: scalar, array, or record carrying the key columns.
        key: Value,
        /// Related records to resolve and attach.
        join_fetch: Option<Vec<JoinSpec>>,
    },
    /// Search with a condition and options.
    Search {
        /// Declarative condition.
        condition: Value,
        /// Ordering, pagination and joins.
        options: QueryOptions,
    },
    /// Like `Search` but returns only the first record.
    SearchFirst {
        /// Declarative condition.
        condition: Value,
        /// Ordering, pagination and joins.
        options: QueryOptions,
    },
}

/// Result of one batched read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    /// From `GetByPk` or `SearchFirst`.
    One(Option<Record>),
    /// From `Search`.
    Many(Vec<Record>),
}

/// Builds the condition selecting one record by primary key.
///
/// The key may be a scalar (single-column keys), an array matching the
/// key columns in order, or a record carrying the key columns.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] when the key shape does not cover
/// the table's key columns.
pub fn pk_condition(table: &TableSchema, key: &Value) -> StoreResult<Condition> {
    let values: Vec<Value> = match key {
        Value::Array(items) => items.clone(),
        Value::Object(map) => table
            .pk
            .iter()
            .map(|col| {
                map.get(col).cloned().ok_or_else(|| {
                    StoreError::validation(format!(
                        "record for table {} misses key column {col}",
                        table.name
                    ))
                })
            })
            .collect::<StoreResult<_>>()?,
        scalar => vec![scalar.clone()],
    };

    if values.len() != table.pk.len() {
        return Err(StoreError::validation(format!(
            "table {} has a {}-column key, got {} value(s)",
            table.name,
            table.pk.len(),
            values.len()
        )));
    }

    Ok(Condition::And(
        table
            .pk
            .iter()
            .zip(values)
            .map(|(col, value)| Condition::eq(col.clone(), value))
            .collect(),
    ))
}

/// Fetches records during join resolution.
///
/// Implemented by engine internals so the resolver stays independent of
/// how records are stored.
pub trait RecordFetcher {
    /// Returns the records of `table` matching `condition`, ordered and
    /// truncated when asked.
    fn fetch(
        &self,
        table: &str,
        condition: &Condition,
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Record>>;
}

/// The contract a storage backend implements.
///
/// # Invariants
///
/// * `prepare` is called once before any other method; the namespace and
///   schema it installs hold until `set_schema` replaces the latter.
/// * `insert` stamps a fresh record's version counter to zero and `update`
///   bumps the stored counter, unless the incoming record carries the
///   counter explicitly (replicated rows keep the value they arrived with).
/// * `transactional_changes` applies all entries or none.
/// * Reads never observe a partially applied batch.
pub trait StorageEngine: Send + Sync {
    /// Installs the namespace and schema, creating missing tables.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend cannot materialize the schema.
    fn prepare(&self, options: PrepareOptions) -> StoreResult<()>;

    /// Returns the installed schema.
    ///
    /// # Errors
    ///
    /// Fails when `prepare` has not run.
    fn schema(&self) -> StoreResult<Schema>;

    /// Replaces the schema, creating tables that appeared.
    ///
    /// # Errors
    ///
    /// Fails when `prepare` has not run.
    fn set_schema(&self, schema: Schema) -> StoreResult<()>;

    /// Inserts a record and returns it as stored.
    ///
    /// # Errors
    ///
    /// Fails on unknown tables, missing key columns, or a key collision.
    fn insert(&self, table: &str, record: Record) -> StoreResult<Record>;

    /// Updates the record with the same primary key and returns it as
    /// stored.
    ///
    /// # Errors
    ///
    /// Fails when no record carries that key.
    fn update(&self, table: &str, record: Record) -> StoreResult<Record>;

    /// Removes one record by primary key. Removing an absent record is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Fails on unknown tables or malformed keys.
    fn remove(&self, table: &str, key: &Value) -> StoreResult<()>;

    /// Removes every record matching `condition`, returning the count.
    ///
    /// # Errors
    ///
    /// Fails on unknown tables or malformed conditions.
    fn remove_where(&self, table: &str, condition: &Value) -> StoreResult<usize>;

    /// Fetches one record by primary key, resolving `join_fetch` the way
    /// [`StorageEngine::search`] does.
    ///
    /// # Errors
    ///
    /// Fails on unknown tables, malformed keys or malformed join specs.
    fn get_by_pk(
        &self,
        table: &str,
        key: &Value,
        join_fetch: Option<&[JoinSpec]>,
    ) -> StoreResult<Option<Record>>;

    /// Searches a table.
    ///
    /// The pipeline is: filter by `condition`, order, apply offset and
    /// limit, decode typed columns, then resolve joins.
    ///
    /// # Errors
    ///
    /// Fails on unknown tables, malformed conditions, order clauses or
    /// join specs.
    fn search(&self, table: &str, condition: &Value, options: &QueryOptions)
        -> StoreResult<Vec<Record>>;

    /// Like [`StorageEngine::search`] with the result truncated to the
    /// first record.
    ///
    /// # Errors
    ///
    /// Same failure modes as `search`.
    fn search_first(
        &self,
        table: &str,
        condition: &Value,
        options: &QueryOptions,
    ) -> StoreResult<Option<Record>>;

    /// Runs several reads against one consistent view of the data.
    ///
    /// # Errors
    ///
    /// Fails when any single read fails; no partial result is returned.
    fn multiread(&self, specs: &[ReadSpec]) -> StoreResult<BTreeMap<String, ReadResult>>;

    /// Applies a batch of changes atomically.
    ///
    /// `Auto` entries are resolved against the stored data and come back
    /// as the concrete `Insert` or `Update` that was applied; all other
    /// entries come back carrying the record as stored.
    ///
    /// # Errors
    ///
    /// Fails without applying anything when any entry fails.
    fn transactional_changes(&self, entries: Vec<ChangeEntry>) -> StoreResult<Vec<ChangeEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> TableSchema {
        TableSchema::new("event", &["uid", "day"], &["uid", "day", "label"])
    }

    #[test]
    fn pk_condition_from_array_and_record() {
        let t = table();
        let from_array = pk_condition(&t, &json!(["e1", "2024-01-02"])).unwrap();
        let from_record =
            pk_condition(&t, &json!({"uid": "e1", "day": "2024-01-02", "label": "x"})).unwrap();
        assert_eq!(from_array, from_record);

        let rec: Record =
            serde_json::from_value(json!({"uid": "e1", "day": "2024-01-02"})).unwrap();
        assert!(from_array.matches(&rec));
    }

    #[test]
    fn pk_condition_scalar_requires_single_column_key() {
        let single = TableSchema::new("user", &["uid"], &["uid", "name"]);
        assert!(pk_condition(&single, &json!("u1")).is_ok());

        let err = pk_condition(&table(), &json!("e1")).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[test]
    fn pk_condition_rejects_record_missing_key_column() {
        let err = pk_condition(&table(), &json!({"uid": "e1"})).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }
}
