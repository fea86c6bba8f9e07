//! Related-record resolution.
//!
//! A [`JoinSpec`] attaches records of another table to each search
//! result, following a declared or schema-inferred foreign key. Joins
//! nest (resolving into already attached records) and may flatten a
//! to-one target into the source record.

use crate::condition::Condition;
use crate::engine::RecordFetcher;
use crate::error::{StoreError, StoreResult};
use crate::order::OrderBy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tablesync_core::{record_value, Record, Schema};

/// Cardinality of a join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    /// Attach at most one record, or null.
    #[default]
    #[serde(rename = "2one")]
    ToOne,
    /// Attach every matching record as an array.
    #[serde(rename = "2many")]
    ToMany,
}

/// Declares one join of a search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpec {
    /// Table the join starts from; defaults to the searched table. May
    /// name the target of an earlier join in the same list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_table: Option<String>,
    /// Join column on the source side; inferred from foreign keys when
    /// absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    /// Table the joined records come from.
    pub target_table: String,
    /// Join column on the target side; inferred from foreign keys when
    /// absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    /// Cardinality.
    #[serde(default)]
    pub kind: JoinKind,
    /// Name the result is attached under; defaults to the target table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attach_as: Option<String>,
    /// Merge the target's columns into the source record instead of
    /// attaching a sub-object. To-one only, incompatible with `nested`.
    #[serde(default)]
    pub flatten: bool,
    /// Joins resolved into the attached records.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<JoinSpec>,
    /// Extra condition ANDed with the key match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    /// Order clause for the attached records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
}

impl JoinSpec {
    /// A to-one join toward `target_table` with inferred columns.
    pub fn to_one(target_table: impl Into<String>) -> Self {
        JoinSpec {
            target_table: target_table.into(),
            ..JoinSpec::default()
        }
    }

    /// A to-many join toward `target_table` with inferred columns.
    pub fn to_many(target_table: impl Into<String>) -> Self {
        JoinSpec {
            target_table: target_table.into(),
            kind: JoinKind::ToMany,
            ..JoinSpec::default()
        }
    }

    fn attach_name(&self) -> &str {
        self.attach_as.as_deref().unwrap_or(&self.target_table)
    }
}

/// Resolves `specs` into each of `records`, in declaration order.
///
/// # Errors
///
/// Fails fast on unknown tables, joins with no relating foreign key,
/// half-declared join columns, flattening combined with sub-joins, or a
/// source table that is neither the base nor an earlier join target.
pub fn resolve_joins<F: RecordFetcher>(
    schema: &Schema,
    base_table: &str,
    records: &mut [Record],
    specs: &[JoinSpec],
    fetcher: &F,
) -> StoreResult<()> {
    for (index, spec) in specs.iter().enumerate() {
        match spec.source_table.as_deref() {
            None => {
                for record in records.iter_mut() {
                    resolve_one(schema, base_table, record, spec, fetcher)?;
                }
            }
            Some(source) if source == base_table => {
                for record in records.iter_mut() {
                    resolve_one(schema, base_table, record, spec, fetcher)?;
                }
            }
            Some(source) => {
                let parent = specs[..index]
                    .iter()
                    .find(|p| p.target_table == source)
                    .ok_or_else(|| {
                        StoreError::validation(format!(
                            "join toward {} starts from {source}, which is neither the \
                             searched table nor an earlier join target",
                            spec.target_table
                        ))
                    })?;
                let attach = parent.attach_name().to_string();
                for record in records.iter_mut() {
                    resolve_into_attached(schema, source, record, &attach, spec, fetcher)?;
                }
            }
        }
    }
    Ok(())
}

fn resolve_into_attached<F: RecordFetcher>(
    schema: &Schema,
    source_table: &str,
    record: &mut Record,
    attach: &str,
    spec: &JoinSpec,
    fetcher: &F,
) -> StoreResult<()> {
    let Some(value) = record.remove(attach) else {
        return Ok(());
    };
    let resolved = match value {
        Value::Object(mut child) => {
            resolve_one(schema, source_table, &mut child, spec, fetcher)?;
            Value::Object(child)
        }
        Value::Array(children) => Value::Array(
            children
                .into_iter()
                .map(|item| match item {
                    Value::Object(mut child) => {
                        resolve_one(schema, source_table, &mut child, spec, fetcher)?;
                        Ok(Value::Object(child))
                    }
                    other => Ok(other),
                })
                .collect::<StoreResult<Vec<_>>>()?,
        ),
        other => other,
    };
    record.insert(attach.to_string(), resolved);
    Ok(())
}

fn resolve_one<F: RecordFetcher>(
    schema: &Schema,
    source_table: &str,
    record: &mut Record,
    spec: &JoinSpec,
    fetcher: &F,
) -> StoreResult<()> {
    if spec.flatten && !spec.nested.is_empty() {
        return Err(StoreError::validation(format!(
            "flattening join toward {} cannot carry sub-joins",
            spec.target_table
        )));
    }
    if spec.flatten && spec.kind == JoinKind::ToMany {
        return Err(StoreError::validation(format!(
            "flattening join toward {} must be to-one",
            spec.target_table
        )));
    }

    let (source_column, target_column) = join_columns(schema, source_table, spec)?;
    let attach = spec.attach_name().to_string();

    let key = match record_value(record, &source_column) {
        Some(v) => v.clone(),
        None => {
            // Nothing to relate; keep the shape predictable.
            if !spec.flatten {
                let empty = match spec.kind {
                    JoinKind::ToOne => Value::Null,
                    JoinKind::ToMany => Value::Array(Vec::new()),
                };
                record.insert(attach, empty);
            }
            return Ok(());
        }
    };

    let mut branches = vec![Condition::eq(target_column, key)];
    if let Some(extra) = &spec.extra {
        branches.push(Condition::parse(extra)?);
    }
    let condition = Condition::And(branches);
    let order = spec.order_by.as_deref().map(OrderBy::parse).transpose()?;
    let limit = match spec.kind {
        JoinKind::ToOne => Some(1),
        JoinKind::ToMany => None,
    };

    let mut found = fetcher.fetch(&spec.target_table, &condition, order.as_ref(), limit)?;
    if !spec.nested.is_empty() {
        resolve_joins(schema, &spec.target_table, &mut found, &spec.nested, fetcher)?;
    }

    match spec.kind {
        JoinKind::ToOne => match found.into_iter().next() {
            Some(target) if spec.flatten => {
                for (column, value) in target {
                    record.entry(column).or_insert(value);
                }
            }
            Some(target) => {
                record.insert(attach, Value::Object(target));
            }
            None if spec.flatten => {}
            None => {
                record.insert(attach, Value::Null);
            }
        },
        JoinKind::ToMany => {
            record.insert(
                attach,
                Value::Array(found.into_iter().map(Value::Object).collect()),
            );
        }
    }
    Ok(())
}

/// Returns `(source_column, target_column)` for a join, inferring from
/// foreign keys when the join declares neither.
fn join_columns(
    schema: &Schema,
    source_table: &str,
    spec: &JoinSpec,
) -> StoreResult<(String, String)> {
    match (&spec.source_column, &spec.target_column) {
        (Some(s), Some(t)) => Ok((s.clone(), t.clone())),
        (None, None) => {
            let source = schema.table(source_table)?;
            let target = schema.table(&spec.target_table)?;

            if let Some(fk) = source.fks.iter().find(|fk| fk.target_table == spec.target_table) {
                return Ok((fk.column.clone(), fk.target_column.clone()));
            }
            if let Some(fk) = target.fks.iter().find(|fk| fk.target_table == source_table) {
                return Ok((fk.target_column.clone(), fk.column.clone()));
            }
            Err(StoreError::validation(format!(
                "no foreign key relates {source_table} and {}; declare the join columns",
                spec.target_table
            )))
        }
        _ => Err(StoreError::validation(format!(
            "join between {source_table} and {} declares only one column; declare both or neither",
            spec.target_table
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tablesync_core::TableSchema;

    struct MapFetcher {
        tables: HashMap<String, Vec<Record>>,
    }

    impl MapFetcher {
        fn new(data: Value) -> Self {
            MapFetcher {
                tables: serde_json::from_value(data).unwrap(),
            }
        }
    }

    impl RecordFetcher for MapFetcher {
        fn fetch(
            &self,
            table: &str,
            condition: &Condition,
            order_by: Option<&OrderBy>,
            limit: Option<usize>,
        ) -> StoreResult<Vec<Record>> {
            let mut rows: Vec<Record> = self
                .tables
                .get(table)
                .ok_or_else(|| StoreError::storage(format!("no table {table}")))?
                .iter()
                .filter(|r| condition.matches(r))
                .cloned()
                .collect();
            if let Some(order) = order_by {
                order.apply(&mut rows);
            }
            if let Some(limit) = limit {
                rows.truncate(limit);
            }
            Ok(rows)
        }
    }

    fn schema() -> Schema {
        Schema::new(1)
            .with_table(TableSchema::new("user", &["uid"], &["uid", "name"]))
            .with_table(
                TableSchema::new("event", &["uid"], &["uid", "user_uid", "label"])
                    .with_fk("user_uid", "user", "uid"),
            )
            .with_table(
                TableSchema::new("note", &["uid"], &["uid", "event_uid", "text"])
                    .with_fk("event_uid", "event", "uid"),
            )
    }

    fn fetcher() -> MapFetcher {
        MapFetcher::new(json!({
            "user": [
                {"uid": "u1", "name": "Ada"},
                {"uid": "u2", "name": "Brad"}
            ],
            "event": [
                {"uid": "e1", "user_uid": "u1", "label": "kickoff"},
                {"uid": "e2", "user_uid": "u1", "label": "review"},
                {"uid": "e3", "user_uid": "u2", "label": "retro"}
            ],
            "note": [
                {"uid": "n1", "event_uid": "e1", "text": "bring slides"}
            ]
        }))
    }

    fn one_record(v: Value) -> Vec<Record> {
        vec![serde_json::from_value(v).unwrap()]
    }

    #[test]
    fn to_one_with_inferred_foreign_key() {
        let mut rows = one_record(json!({"uid": "e1", "user_uid": "u1", "label": "kickoff"}));
        resolve_joins(&schema(), "event", &mut rows, &[JoinSpec::to_one("user")], &fetcher())
            .unwrap();
        assert_eq!(rows[0]["user"]["name"], json!("Ada"));
    }

    #[test]
    fn to_many_follows_the_reverse_foreign_key() {
        let mut rows = one_record(json!({"uid": "u1", "name": "Ada"}));
        let spec = JoinSpec {
            order_by: Some("label".into()),
            ..JoinSpec::to_many("event")
        };
        resolve_joins(&schema(), "user", &mut rows, &[spec], &fetcher()).unwrap();
        let labels: Vec<_> = rows[0]["event"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["label"].as_str().unwrap())
            .collect();
        assert_eq!(labels, ["kickoff", "review"]);
    }

    #[test]
    fn to_one_without_match_attaches_null() {
        let mut rows = one_record(json!({"uid": "e9", "user_uid": "u9", "label": "ghost"}));
        resolve_joins(&schema(), "event", &mut rows, &[JoinSpec::to_one("user")], &fetcher())
            .unwrap();
        assert_eq!(rows[0]["user"], Value::Null);
    }

    #[test]
    fn nested_joins_resolve_into_attached_records() {
        let mut rows = one_record(json!({"uid": "u1", "name": "Ada"}));
        let spec = JoinSpec {
            nested: vec![JoinSpec::to_many("note")],
            order_by: Some("uid".into()),
            ..JoinSpec::to_many("event")
        };
        resolve_joins(&schema(), "user", &mut rows, &[spec], &fetcher()).unwrap();
        let events = rows[0]["event"].as_array().unwrap();
        assert_eq!(events[0]["note"][0]["text"], json!("bring slides"));
        assert_eq!(events[1]["note"], json!([]));
    }

    #[test]
    fn source_table_may_reference_an_earlier_join_target() {
        let mut rows = one_record(json!({"uid": "n1", "event_uid": "e1", "text": "bring slides"}));
        let specs = vec![
            JoinSpec::to_one("event"),
            JoinSpec {
                source_table: Some("event".into()),
                ..JoinSpec::to_one("user")
            },
        ];
        resolve_joins(&schema(), "note", &mut rows, &specs, &fetcher()).unwrap();
        assert_eq!(rows[0]["event"]["user"]["name"], json!("Ada"));
    }

    #[test]
    fn flatten_merges_without_clobbering_source_columns() {
        let mut rows = one_record(json!({"uid": "e1", "user_uid": "u1", "label": "kickoff"}));
        let spec = JoinSpec {
            flatten: true,
            ..JoinSpec::to_one("user")
        };
        resolve_joins(&schema(), "event", &mut rows, &[spec], &fetcher()).unwrap();
        assert_eq!(rows[0]["name"], json!("Ada"));
        // "uid" stays the event's key, not the user's.
        assert_eq!(rows[0]["uid"], json!("e1"));
    }

    #[test]
    fn flatten_with_sub_joins_is_rejected() {
        let mut rows = one_record(json!({"uid": "e1", "user_uid": "u1"}));
        let spec = JoinSpec {
            flatten: true,
            nested: vec![JoinSpec::to_many("event")],
            ..JoinSpec::to_one("user")
        };
        let err =
            resolve_joins(&schema(), "event", &mut rows, &[spec], &fetcher()).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[test]
    fn unrelated_tables_without_declared_columns_are_rejected() {
        let mut rows = one_record(json!({"uid": "u1"}));
        let err = resolve_joins(&schema(), "user", &mut rows, &[JoinSpec::to_one("note")], &fetcher())
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));

        let spec = JoinSpec {
            source_column: Some("uid".into()),
            ..JoinSpec::to_one("note")
        };
        let err = resolve_joins(&schema(), "user", &mut rows, &[spec], &fetcher()).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }
}
