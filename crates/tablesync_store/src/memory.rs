//! In-memory reference engine.
//!
//! Implements the whole [`StorageEngine`] contract over namespaced
//! `BTreeMap`s behind one `RwLock`. Change batches restore the previous
//! tables on failure, so readers only ever observe pre- or post-batch
//! state.

use crate::condition::Condition;
use crate::engine::{
    pk_condition, PrepareOptions, QueryOptions, ReadOp, ReadResult, ReadSpec, RecordFetcher,
    StorageEngine,
};
use crate::error::{StoreError, StoreResult};
use crate::join::{resolve_joins, JoinSpec};
use crate::order::OrderBy;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tablesync_core::{
    now_millis, revision_of, stamp_insert, stamp_update, ChangeEntry, ColumnKind, CoreError,
    Record, Schema, TableSchema, ROW_VERSION,
};

type Table = BTreeMap<String, Record>;

/// An in-memory [`StorageEngine`].
pub struct MemoryEngine {
    inner: RwLock<EngineState>,
}

struct EngineState {
    namespace: String,
    schema: Schema,
    tables: HashMap<String, Table>,
    ready: bool,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// An engine with no namespace or schema installed yet.
    pub fn new() -> Self {
        MemoryEngine {
            inner: RwLock::new(EngineState {
                namespace: String::new(),
                schema: Schema::new(0),
                tables: HashMap::new(),
                ready: false,
            }),
        }
    }
}

impl StorageEngine for MemoryEngine {
    fn prepare(&self, options: PrepareOptions) -> StoreResult<()> {
        let mut state = self.inner.write();
        state.namespace = options.namespace;
        state.schema = options.schema;
        state.ready = true;
        state.materialize_tables();
        tracing::debug!(namespace = %state.namespace, "memory engine prepared");
        Ok(())
    }

    fn schema(&self) -> StoreResult<Schema> {
        let state = self.inner.read();
        state.ensure_ready()?;
        Ok(state.schema.clone())
    }

    fn set_schema(&self, schema: Schema) -> StoreResult<()> {
        let mut state = self.inner.write();
        state.ensure_ready()?;
        state.schema = schema;
        state.materialize_tables();
        Ok(())
    }

    fn insert(&self, table: &str, record: Record) -> StoreResult<Record> {
        self.apply_single(ChangeEntry::Insert {
            table: table.to_string(),
            record,
        })
    }

    fn update(&self, table: &str, record: Record) -> StoreResult<Record> {
        self.apply_single(ChangeEntry::Update {
            table: table.to_string(),
            record,
        })
    }

    fn remove(&self, table: &str, key: &Value) -> StoreResult<()> {
        let mut state = self.inner.write();
        state.ensure_ready()?;
        let condition = pk_condition(state.table_schema(table)?, key)?;
        state.remove_matching(table, &condition)?;
        Ok(())
    }

    fn remove_where(&self, table: &str, condition: &Value) -> StoreResult<usize> {
        let mut state = self.inner.write();
        state.ensure_ready()?;
        state.table_schema(table)?;
        let condition = parse_condition(condition)?;
        state.remove_matching(table, &condition)
    }

    fn get_by_pk(
        &self,
        table: &str,
        key: &Value,
        join_fetch: Option<&[JoinSpec]>,
    ) -> StoreResult<Option<Record>> {
        let state = self.inner.read();
        state.ensure_ready()?;
        state.get_by_pk(table, key, join_fetch)
    }

    fn search(
        &self,
        table: &str,
        condition: &Value,
        options: &QueryOptions,
    ) -> StoreResult<Vec<Record>> {
        let state = self.inner.read();
        state.ensure_ready()?;
        state.search(table, condition, options)
    }

    fn search_first(
        &self,
        table: &str,
        condition: &Value,
        options: &QueryOptions,
    ) -> StoreResult<Option<Record>> {
        let mut options = options.clone();
        options.limit = Some(1);
        Ok(self.search(table, condition, &options)?.pop())
    }

    fn multiread(&self, specs: &[ReadSpec]) -> StoreResult<BTreeMap<String, ReadResult>> {
        let state = self.inner.read();
        state.ensure_ready()?;
        let mut results = BTreeMap::new();
        for spec in specs {
            let result = match &spec.op {
                ReadOp::GetByPk { key, join_fetch } => {
                    ReadResult::One(state.get_by_pk(&spec.table, key, join_fetch.as_deref())?)
                }
                ReadOp::Search { condition, options } => {
                    ReadResult::Many(state.search(&spec.table, condition, options)?)
                }
                ReadOp::SearchFirst { condition, options } => {
                    let mut options = options.clone();
                    options.limit = Some(1);
                    ReadResult::One(state.search(&spec.table, condition, &options)?.pop())
                }
            };
            results.insert(spec.name.clone(), result);
        }
        Ok(results)
    }

    fn transactional_changes(&self, entries: Vec<ChangeEntry>) -> StoreResult<Vec<ChangeEntry>> {
        let mut state = self.inner.write();
        state.ensure_ready()?;
        let backup = state.tables.clone();
        let now = now_millis();
        let mut applied = Vec::with_capacity(entries.len());
        for entry in entries {
            match state.apply(entry, now) {
                Ok(resolved) => applied.push(resolved),
                Err(err) => {
                    state.tables = backup;
                    return Err(err);
                }
            }
        }
        tracing::debug!(changes = applied.len(), "change batch applied");
        Ok(applied)
    }
}

impl MemoryEngine {
    fn apply_single(&self, entry: ChangeEntry) -> StoreResult<Record> {
        let mut state = self.inner.write();
        state.ensure_ready()?;
        let backup = state.tables.clone();
        match state.apply(entry, now_millis()) {
            Ok(ChangeEntry::Insert { record, .. } | ChangeEntry::Update { record, .. }) => {
                Ok(record)
            }
            Ok(_) => Err(StoreError::storage("write resolved to a non-record entry")),
            Err(err) => {
                state.tables = backup;
                Err(err)
            }
        }
    }
}

impl EngineState {
    fn ensure_ready(&self) -> StoreResult<()> {
        if self.ready {
            Ok(())
        } else {
            Err(StoreError::storage("engine used before prepare"))
        }
    }

    fn materialize_tables(&mut self) {
        let names: Vec<String> = self.schema.table_names().map(str::to_string).collect();
        for name in names {
            let key = self.storage_key(&name);
            self.tables.entry(key).or_default();
        }
    }

    fn storage_key(&self, table: &str) -> String {
        format!("{}.{table}", self.namespace)
    }

    fn table_schema(&self, table: &str) -> StoreResult<&TableSchema> {
        Ok(self.schema.table(table)?)
    }

    fn rows(&self, table: &str) -> StoreResult<&Table> {
        self.table_schema(table)?;
        self.tables
            .get(&self.storage_key(table))
            .ok_or_else(|| CoreError::unknown_table(table).into())
    }

    fn filter(&self, table: &str, condition: &Condition) -> StoreResult<Vec<Record>> {
        Ok(self
            .rows(table)?
            .values()
            .filter(|record| condition.matches(record))
            .cloned()
            .collect())
    }

    fn get_by_pk(
        &self,
        table: &str,
        key: &Value,
        join_fetch: Option<&[JoinSpec]>,
    ) -> StoreResult<Option<Record>> {
        let condition = pk_condition(self.table_schema(table)?, key)?;
        let mut rows = self.filter(table, &condition)?;
        rows.truncate(1);
        let Some(mut record) = rows.pop() else {
            return Ok(None);
        };
        self.decode(table, &mut record);
        if let Some(joins) = join_fetch {
            let mut rows = vec![record];
            resolve_joins(&self.schema, table, &mut rows, joins, &StateFetcher { state: self })?;
            return Ok(rows.pop());
        }
        Ok(Some(record))
    }

    fn search(
        &self,
        table: &str,
        condition: &Value,
        options: &QueryOptions,
    ) -> StoreResult<Vec<Record>> {
        let condition = parse_condition(condition)?;
        let mut rows = self.filter(table, &condition)?;
        if let Some(clause) = &options.order_by {
            OrderBy::parse(clause)?.apply(&mut rows);
        }
        if let Some(offset) = options.offset {
            rows.drain(..offset.min(rows.len()));
        }
        if let Some(limit) = options.limit {
            rows.truncate(limit);
        }
        for record in &mut rows {
            self.decode(table, record);
        }
        if let Some(joins) = &options.join_fetch {
            resolve_joins(&self.schema, table, &mut rows, joins, &StateFetcher { state: self })?;
        }
        Ok(rows)
    }

    fn remove_matching(&mut self, table: &str, condition: &Condition) -> StoreResult<usize> {
        self.table_schema(table)?;
        let key = self.storage_key(table);
        let rows = self
            .tables
            .get_mut(&key)
            .ok_or_else(|| CoreError::unknown_table(table))?;
        let before = rows.len();
        rows.retain(|_, record| !condition.matches(record));
        Ok(before - rows.len())
    }

    fn apply(&mut self, entry: ChangeEntry, now: i64) -> StoreResult<ChangeEntry> {
        match entry {
            ChangeEntry::Insert { table, record } => {
                let stored = self.apply_insert(&table, record, now)?;
                Ok(ChangeEntry::Insert { table, record: stored })
            }
            ChangeEntry::Update { table, record } => {
                let stored = self.apply_update(&table, record, now, true)?;
                Ok(ChangeEntry::Update { table, record: stored })
            }
            ChangeEntry::Auto { table, record } => {
                let schema = self.table_schema(&table)?;
                let key = row_key(schema, &record)?;
                let exists = self.rows(&table)?.contains_key(&key);
                if exists {
                    let stored = self.apply_update(&table, record, now, false)?;
                    Ok(ChangeEntry::Update { table, record: stored })
                } else {
                    let stored = self.apply_insert(&table, record, now)?;
                    Ok(ChangeEntry::Insert { table, record: stored })
                }
            }
            ChangeEntry::Remove { table, record } => {
                let schema = self.table_schema(&table)?;
                let condition = pk_condition(schema, &Value::Object(record.clone()))?;
                self.remove_matching(&table, &condition)?;
                Ok(ChangeEntry::Remove { table, record })
            }
            ChangeEntry::RemoveWhere { table, condition } => {
                self.table_schema(&table)?;
                let parsed = parse_condition(&condition)?;
                self.remove_matching(&table, &parsed)?;
                Ok(ChangeEntry::RemoveWhere { table, condition })
            }
        }
    }

    fn apply_insert(&mut self, table: &str, mut record: Record, now: i64) -> StoreResult<Record> {
        let schema = self.table_schema(table)?;
        encode(schema, &mut record);
        // Replicated rows arrive with their revision; fresh rows get 0.
        if !record.contains_key(ROW_VERSION) {
            stamp_insert(&mut record, now);
        }
        let key = row_key(schema, &record)?;
        let storage_key = self.storage_key(table);
        let rows = self
            .tables
            .get_mut(&storage_key)
            .ok_or_else(|| CoreError::unknown_table(table))?;
        if rows.contains_key(&key) {
            return Err(StoreError::validation(format!(
                "insert into {table} collides on key {key}"
            )));
        }
        rows.insert(key, record.clone());
        Ok(record)
    }

    /// `local` updates always bump the revision; replica updates keep an
    /// explicitly carried revision untouched.
    fn apply_update(
        &mut self,
        table: &str,
        mut record: Record,
        now: i64,
        local: bool,
    ) -> StoreResult<Record> {
        let schema = self.table_schema(table)?;
        encode(schema, &mut record);
        let key = row_key(schema, &record)?;
        let storage_key = self.storage_key(table);
        let rows = self
            .tables
            .get_mut(&storage_key)
            .ok_or_else(|| CoreError::unknown_table(table))?;
        let stored = rows.get(&key).ok_or_else(|| StoreError::RecordNotFound {
            table: table.to_string(),
        })?;

        let mut merged = stored.clone();
        let stored_revision = revision_of(stored);
        let carries_revision = record.contains_key(ROW_VERSION);
        for (column, value) in record {
            merged.insert(column, value);
        }
        if local || !carries_revision {
            stamp_update(&mut merged, stored_revision, now);
        }
        rows.insert(key, merged.clone());
        Ok(merged)
    }

    fn decode(&self, table: &str, record: &mut Record) {
        let Ok(schema) = self.schema.table(table) else {
            return;
        };
        for column in &schema.columns {
            match column.kind {
                ColumnKind::Plain => {}
                ColumnKind::Multiple => {
                    let decoded = match record.get(&column.name) {
                        None | Some(Value::Null) => Value::Array(Vec::new()),
                        Some(Value::Array(items)) => Value::Array(items.clone()),
                        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                            Ok(Value::Array(items)) => Value::Array(items),
                            Ok(other) => Value::Array(vec![other]),
                            Err(_) => Value::Array(vec![Value::String(text.clone())]),
                        },
                        Some(scalar) => Value::Array(vec![scalar.clone()]),
                    };
                    record.insert(column.name.clone(), decoded);
                }
                ColumnKind::Json => {
                    if let Some(Value::String(text)) = record.get(&column.name) {
                        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                            record.insert(column.name.clone(), parsed);
                        }
                    }
                }
            }
        }
    }
}

/// Typed columns are stored in their string form.
fn encode(schema: &TableSchema, record: &mut Record) {
    for column in &schema.columns {
        if column.kind == ColumnKind::Plain {
            continue;
        }
        if let Some(value) = record.get(&column.name) {
            if !value.is_string() && !value.is_null() {
                let text = value.to_string();
                record.insert(column.name.clone(), Value::String(text));
            }
        }
    }
}

fn row_key(schema: &TableSchema, record: &Record) -> StoreResult<String> {
    let values = schema.pk_values(record)?;
    Ok(Value::Array(values).to_string())
}

fn parse_condition(value: &Value) -> StoreResult<Condition> {
    if value.is_null() {
        Ok(Condition::always())
    } else {
        Condition::parse(value)
    }
}

struct StateFetcher<'a> {
    state: &'a EngineState,
}

impl RecordFetcher for StateFetcher<'_> {
    fn fetch(
        &self,
        table: &str,
        condition: &Condition,
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Record>> {
        let mut rows = self.state.filter(table, condition)?;
        if let Some(order) = order_by {
            order.apply(&mut rows);
        }
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        for record in &mut rows {
            self.state.decode(table, record);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tablesync_core::{ROW_MODIFIED, ROW_VERSION};

    fn record(v: Value) -> Record {
        serde_json::from_value(v).unwrap()
    }

    fn engine() -> MemoryEngine {
        let schema = Schema::new(1)
            .with_table(TableSchema::new("user", &["uid"], &["uid", "name"]))
            .with_table(
                TableSchema::new("event", &["uid"], &["uid", "user_uid", "label", "tags"])
                    .with_fk("user_uid", "user", "uid")
                    .with_column_kind("tags", ColumnKind::Multiple),
            );
        let engine = MemoryEngine::new();
        engine
            .prepare(PrepareOptions {
                namespace: "acct1".into(),
                schema,
            })
            .unwrap();
        engine
    }

    #[test]
    fn use_before_prepare_fails() {
        let engine = MemoryEngine::new();
        assert!(engine.schema().is_err());
        assert!(engine.insert("user", Record::new()).is_err());
    }

    #[test]
    fn insert_stamps_fresh_records() {
        let engine = engine();
        let stored = engine
            .insert("user", record(json!({"uid": "u1", "name": "Ada"})))
            .unwrap();
        assert_eq!(stored[ROW_VERSION], json!(0));
        assert!(stored[ROW_MODIFIED].as_i64().unwrap() > 0);
    }

    #[test]
    fn insert_keeps_an_explicit_revision() {
        let engine = engine();
        let stored = engine
            .insert("user", record(json!({"uid": "u1", "name": "Ada", "row_version": 7})))
            .unwrap();
        assert_eq!(stored[ROW_VERSION], json!(7));
    }

    #[test]
    fn insert_collision_is_rejected() {
        let engine = engine();
        engine
            .insert("user", record(json!({"uid": "u1", "name": "Ada"})))
            .unwrap();
        let err = engine
            .insert("user", record(json!({"uid": "u1", "name": "Twin"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[test]
    fn update_merges_and_bumps_revision() {
        let engine = engine();
        engine
            .insert("user", record(json!({"uid": "u1", "name": "Ada"})))
            .unwrap();
        let stored = engine
            .update("user", record(json!({"uid": "u1", "name": "Ada L."})))
            .unwrap();
        assert_eq!(stored[ROW_VERSION], json!(1));
        assert_eq!(stored["name"], json!("Ada L."));

        let err = engine
            .update("user", record(json!({"uid": "ghost", "name": "x"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
    }

    #[test]
    fn auto_trusts_a_replicated_revision() {
        let engine = engine();
        engine
            .insert("user", record(json!({"uid": "u1", "name": "Ada"})))
            .unwrap();
        let applied = engine
            .transactional_changes(vec![ChangeEntry::Auto {
                table: "user".into(),
                record: record(json!({"uid": "u1", "name": "Ada", "row_version": 0})),
            }])
            .unwrap();
        let ChangeEntry::Update { record: stored, .. } = &applied[0] else {
            panic!("auto over an existing key resolves to update");
        };
        assert_eq!(stored[ROW_VERSION], json!(0));
    }

    #[test]
    fn auto_resolves_to_insert_when_absent() {
        let engine = engine();
        let applied = engine
            .transactional_changes(vec![ChangeEntry::Auto {
                table: "user".into(),
                record: record(json!({"uid": "u1", "name": "Ada"})),
            }])
            .unwrap();
        assert!(matches!(applied[0], ChangeEntry::Insert { .. }));
    }

    #[test]
    fn search_orders_paginates_and_filters() {
        let engine = engine();
        for (uid, name) in [("u1", "Cleo"), ("u2", "Ada"), ("u3", "Brad"), ("u4", "Ada")] {
            engine
                .insert("user", record(json!({"uid": uid, "name": name})))
                .unwrap();
        }
        let rows = engine
            .search(
                "user",
                &json!({"name": {"ope": "<>", "value": "Brad"}}),
                &QueryOptions {
                    order_by: Some("name, uid".into()),
                    offset: Some(1),
                    limit: Some(2),
                    ..QueryOptions::default()
                },
            )
            .unwrap();
        let uids: Vec<_> = rows.iter().map(|r| r["uid"].as_str().unwrap()).collect();
        assert_eq!(uids, ["u4", "u1"]);
    }

    #[test]
    fn multiple_columns_decode_on_read() {
        let engine = engine();
        engine
            .insert(
                "event",
                record(json!({"uid": "e1", "user_uid": "u1", "label": "x", "tags": ["a", "b"]})),
            )
            .unwrap();
        engine
            .insert("event", record(json!({"uid": "e2", "user_uid": "u1", "label": "y"})))
            .unwrap();

        let rows = engine
            .search("event", &Value::Null, &QueryOptions::default())
            .unwrap();
        assert_eq!(rows[0]["tags"], json!(["a", "b"]));
        assert_eq!(rows[1]["tags"], json!([]));
    }

    #[test]
    fn search_resolves_joins() {
        let engine = engine();
        engine
            .insert("user", record(json!({"uid": "u1", "name": "Ada"})))
            .unwrap();
        engine
            .insert("event", record(json!({"uid": "e1", "user_uid": "u1", "label": "kickoff"})))
            .unwrap();

        let rows = engine
            .search(
                "event",
                &Value::Null,
                &QueryOptions {
                    join_fetch: Some(vec![JoinSpec::to_one("user")]),
                    ..QueryOptions::default()
                },
            )
            .unwrap();
        assert_eq!(rows[0]["user"]["name"], json!("Ada"));
    }

    #[test]
    fn get_by_pk_resolves_joins() {
        let engine = engine();
        engine
            .insert("user", record(json!({"uid": "u1", "name": "Ada"})))
            .unwrap();
        engine
            .insert("event", record(json!({"uid": "e1", "user_uid": "u1", "label": "kickoff"})))
            .unwrap();

        let joins = vec![JoinSpec::to_one("user")];
        let row = engine
            .get_by_pk("event", &json!("e1"), Some(&joins))
            .unwrap()
            .unwrap();
        assert_eq!(row["user"]["name"], json!("Ada"));

        let results = engine
            .multiread(&[ReadSpec {
                name: "joined".into(),
                table: "event".into(),
                op: ReadOp::GetByPk {
                    key: json!("e1"),
                    join_fetch: Some(joins),
                },
            }])
            .unwrap();
        let ReadResult::One(Some(row)) = &results["joined"] else {
            panic!("expected one joined record");
        };
        assert_eq!(row["user"]["name"], json!("Ada"));
    }

    #[test]
    fn failed_batch_leaves_state_untouched() {
        let engine = engine();
        engine
            .insert("user", record(json!({"uid": "u1", "name": "Ada"})))
            .unwrap();
        let err = engine
            .transactional_changes(vec![
                ChangeEntry::Insert {
                    table: "user".into(),
                    record: record(json!({"uid": "u2", "name": "Brad"})),
                },
                ChangeEntry::Update {
                    table: "user".into(),
                    record: record(json!({"uid": "ghost", "name": "nope"})),
                },
            ])
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
        assert!(engine.get_by_pk("user", &json!("u2"), None).unwrap().is_none());
        assert!(engine.get_by_pk("user", &json!("u1"), None).unwrap().is_some());
    }

    #[test]
    fn remove_and_remove_where() {
        let engine = engine();
        for uid in ["u1", "u2", "u3"] {
            engine
                .insert("user", record(json!({"uid": uid, "name": uid})))
                .unwrap();
        }
        engine.remove("user", &json!("u1")).unwrap();
        // Absent keys are not an error.
        engine.remove("user", &json!("u1")).unwrap();

        let removed = engine
            .remove_where("user", &json!({"uid": ["u2", "u3"]}))
            .unwrap();
        assert_eq!(removed, 2);
        assert!(engine
            .search("user", &Value::Null, &QueryOptions::default())
            .unwrap()
            .is_empty());
    }

    // Property: replaying the same change sequence into two fresh engines
    // produces identical tables (timestamps aside).

    fn strip_modified(mut rows: Vec<Record>) -> Vec<Record> {
        for row in &mut rows {
            row.remove(tablesync_core::ROW_MODIFIED);
        }
        rows
    }

    proptest::proptest! {
        #[test]
        fn replay_is_deterministic(
            steps in proptest::collection::vec((0u8..4, 0i64..100), 0..24)
        ) {
            let entries: Vec<ChangeEntry> = steps
                .iter()
                .map(|(uid, value)| {
                    if *value % 5 == 0 {
                        ChangeEntry::Remove {
                            table: "user".into(),
                            record: record(json!({"uid": format!("u{uid}")})),
                        }
                    } else {
                        ChangeEntry::Auto {
                            table: "user".into(),
                            record: record(json!({"uid": format!("u{uid}"), "n": value})),
                        }
                    }
                })
                .collect();

            let a = engine();
            let b = engine();
            for entry in &entries {
                a.transactional_changes(vec![entry.clone()]).unwrap();
                b.transactional_changes(vec![entry.clone()]).unwrap();
            }
            let rows_a = a.search("user", &Value::Null, &QueryOptions::default()).unwrap();
            let rows_b = b.search("user", &Value::Null, &QueryOptions::default()).unwrap();
            proptest::prop_assert_eq!(strip_modified(rows_a), strip_modified(rows_b));
        }
    }

    #[test]
    fn multiread_returns_every_named_result() {
        let engine = engine();
        engine
            .insert("user", record(json!({"uid": "u1", "name": "Ada"})))
            .unwrap();
        let results = engine
            .multiread(&[
                ReadSpec {
                    name: "one".into(),
                    table: "user".into(),
                    op: ReadOp::GetByPk {
                        key: json!("u1"),
                        join_fetch: None,
                    },
                },
                ReadSpec {
                    name: "all".into(),
                    table: "user".into(),
                    op: ReadOp::Search {
                        condition: Value::Null,
                        options: QueryOptions::default(),
                    },
                },
                ReadSpec {
                    name: "none".into(),
                    table: "user".into(),
                    op: ReadOp::SearchFirst {
                        condition: json!({"name": "Brad"}),
                        options: QueryOptions::default(),
                    },
                },
            ])
            .unwrap();
        assert!(matches!(&results["one"], ReadResult::One(Some(_))));
        assert!(matches!(&results["all"], ReadResult::Many(rows) if rows.len() == 1));
        assert!(matches!(&results["none"], ReadResult::One(None)));
    }
}
