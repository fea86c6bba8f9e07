//! Result ordering.

use crate::condition::compare;
use crate::error::{StoreError, StoreResult};
use serde_json::Value;
use std::cmp::Ordering;
use tablesync_core::{record_value, Record};

/// A parsed `order by` clause.
///
/// The textual form is a comma-separated column list with an optional
/// trailing `desc` or `asc` keyword applying to the whole clause, e.g.
/// `"family, name desc"`. Mixing directions across columns is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Columns compared in declaration order.
    pub columns: Vec<String>,
    /// True when the whole clause sorts descending.
    pub descending: bool,
}

impl OrderBy {
    /// Parses an order clause.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] on an empty clause or when the
    /// columns carry conflicting directions.
    pub fn parse(clause: &str) -> StoreResult<Self> {
        let mut columns = Vec::new();
        let mut direction: Option<bool> = None;

        for part in clause.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let mut tokens = part.split_whitespace();
            let column = tokens.next().unwrap_or_default().to_string();
            let descending = match tokens.next().map(str::to_lowercase).as_deref() {
                None => false,
                Some("asc") => false,
                Some("desc") => true,
                Some(other) => {
                    return Err(StoreError::validation(format!(
                        "unknown sort direction {other} in order clause {clause:?}"
                    )))
                }
            };
            match direction {
                None => direction = Some(descending),
                Some(d) if d != descending => {
                    return Err(StoreError::validation(format!(
                        "order clause {clause:?} mixes ascending and descending columns"
                    )))
                }
                Some(_) => {}
            }
            columns.push(column);
        }

        if columns.is_empty() {
            return Err(StoreError::validation("empty order clause"));
        }
        Ok(OrderBy {
            columns,
            descending: direction.unwrap_or(false),
        })
    }

    /// Stable-sorts the records in place.
    ///
    /// Absent and null values sort before present ones; values without a
    /// defined ordering keep their relative position.
    pub fn apply(&self, records: &mut [Record]) {
        records.sort_by(|a, b| {
            let mut ord = Ordering::Equal;
            for column in &self.columns {
                ord = cmp_values(record_value(a, column), record_value(b, column));
                if ord != Ordering::Equal {
                    break;
                }
            }
            if self.descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }
}

fn cmp_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recs(v: Value) -> Vec<Record> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn single_column_ascending_by_default() {
        let order = OrderBy::parse("name").unwrap();
        let mut rows = recs(json!([{"name": "b"}, {"name": "a"}, {"name": "c"}]));
        order.apply(&mut rows);
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn multi_column_descending() {
        let order = OrderBy::parse("family desc, name desc").unwrap();
        assert!(order.descending);
        let mut rows = recs(json!([
            {"family": "a", "name": "x"},
            {"family": "b", "name": "m"},
            {"family": "b", "name": "z"}
        ]));
        order.apply(&mut rows);
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["z", "m", "x"]);
    }

    #[test]
    fn mixed_directions_rejected() {
        let err = OrderBy::parse("a asc, b desc").unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[test]
    fn empty_clause_rejected() {
        assert!(OrderBy::parse("  ").is_err());
    }

    #[test]
    fn null_sorts_first_and_sort_is_stable() {
        let order = OrderBy::parse("n").unwrap();
        let mut rows = recs(json!([
            {"n": 2, "tag": "first"},
            {"n": null, "tag": "null"},
            {"n": 2, "tag": "second"}
        ]));
        order.apply(&mut rows);
        let tags: Vec<_> = rows.iter().map(|r| r["tag"].as_str().unwrap()).collect();
        assert_eq!(tags, ["null", "first", "second"]);
    }
}
