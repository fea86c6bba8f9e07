//! Declarative condition trees and predicate evaluation.
//!
//! A condition arrives as a JSON object mapping column names to matchers;
//! multiple keys are implicitly ANDed. The reserved keys `$or` and `$and`
//! hold arrays of sub-conditions evaluated recursively with
//! short-circuiting. Matchers may be a literal (loose equality), an array
//! (membership), a string carrying `%` or `*` wildcards, or an explicit
//! `{"ope": .., "value": ..}` object.

use crate::error::{StoreError, StoreResult};
use serde_json::Value;
use tablesync_core::{record_value, Record};

/// Comparison operator of an explicit `{ope, value}` matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `<>`
    Ne,
}

impl CompareOp {
    fn parse(ope: &str) -> Option<Self> {
        match ope {
            "=" => Some(CompareOp::Eq),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            "<>" => Some(CompareOp::Ne),
            _ => None,
        }
    }
}

/// How a single column is matched.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Loose equality with a literal.
    Eq(Value),
    /// Value must be a member of the list.
    In(Vec<Value>),
    /// Value must be absent from the list.
    NotIn(Vec<Value>),
    /// Case-insensitive wildcard pattern (`%` and `*` match any run).
    Like(String),
    /// Ordered comparison against a literal.
    Compare {
        /// The operator.
        op: CompareOp,
        /// The right-hand side.
        value: Value,
    },
    /// Inclusive range check on both bounds.
    Between(Value, Value),
}

/// A parsed condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Every branch must match; empty matches everything.
    And(Vec<Condition>),
    /// At least one branch must match; empty matches nothing.
    Or(Vec<Condition>),
    /// One column matched against a [`Matcher`].
    Column {
        /// Column name.
        column: String,
        /// The matcher.
        matcher: Matcher,
    },
}

impl Condition {
    /// The condition matching every record.
    pub fn always() -> Self {
        Condition::And(Vec::new())
    }

    /// Builds an equality condition on one column.
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Condition::Column {
            column: column.into(),
            matcher: Matcher::Eq(value),
        }
    }

    /// Parses a condition from its declarative JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for unknown operators, malformed
    /// `$or`/`$and` arms, or matcher objects without an `ope` field.
    pub fn parse(value: &Value) -> StoreResult<Self> {
        let map = value.as_object().ok_or_else(|| {
            StoreError::validation(format!("condition must be a JSON object, got {value}"))
        })?;

        let mut clauses = Vec::with_capacity(map.len());
        for (key, val) in map {
            match key.as_str() {
                "$or" => clauses.push(Condition::Or(Self::parse_branches(key, val)?)),
                "$and" => clauses.push(Condition::And(Self::parse_branches(key, val)?)),
                column => clauses.push(Condition::Column {
                    column: column.to_string(),
                    matcher: Matcher::parse(column, val)?,
                }),
            }
        }

        if clauses.len() == 1 {
            Ok(clauses.pop().unwrap_or_else(Condition::always))
        } else {
            Ok(Condition::And(clauses))
        }
    }

    fn parse_branches(key: &str, val: &Value) -> StoreResult<Vec<Condition>> {
        let arr = val
            .as_array()
            .ok_or_else(|| StoreError::validation(format!("{key} expects an array")))?;
        arr.iter().map(Condition::parse).collect()
    }

    /// Evaluates the condition against a record.
    ///
    /// Boolean composition short-circuits; a null or absent column only
    /// matches an explicit equality with null.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Condition::And(branches) => branches.iter().all(|c| c.matches(record)),
            Condition::Or(branches) => branches.iter().any(|c| c.matches(record)),
            Condition::Column { column, matcher } => {
                matcher.matches(record_value(record, column))
            }
        }
    }
}

impl Matcher {
    fn parse(column: &str, val: &Value) -> StoreResult<Self> {
        match val {
            Value::Array(items) => Ok(Matcher::In(items.clone())),
            Value::String(s) if s.contains('%') || s.contains('*') => {
                Ok(Matcher::Like(s.clone()))
            }
            Value::Object(map) => {
                let ope = map.get("ope").and_then(Value::as_str).ok_or_else(|| {
                    StoreError::validation(format!(
                        "matcher for column {column} must carry an \"ope\" field"
                    ))
                })?;
                let value = map.get("value").cloned().unwrap_or(Value::Null);
                Self::parse_operator(column, ope, value)
            }
            literal => Ok(Matcher::Eq(literal.clone())),
        }
    }

    fn parse_operator(column: &str, ope: &str, value: Value) -> StoreResult<Self> {
        if let Some(op) = CompareOp::parse(ope) {
            return Ok(Matcher::Compare { op, value });
        }
        match ope {
            "in" => Ok(Matcher::In(Self::expect_list(column, ope, value)?)),
            "not in" => Ok(Matcher::NotIn(Self::expect_list(column, ope, value)?)),
            "between" => {
                let mut bounds = Self::expect_list(column, ope, value)?;
                if bounds.len() != 2 {
                    return Err(StoreError::validation(format!(
                        "between on column {column} expects exactly two bounds"
                    )));
                }
                let high = bounds.pop().unwrap_or(Value::Null);
                let low = bounds.pop().unwrap_or(Value::Null);
                Ok(Matcher::Between(low, high))
            }
            other => Err(StoreError::validation(format!(
                "unknown operator on column {column}: {other}"
            ))),
        }
    }

    fn expect_list(column: &str, ope: &str, value: Value) -> StoreResult<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items),
            _ => Err(StoreError::validation(format!(
                "operator \"{ope}\" on column {column} expects an array value"
            ))),
        }
    }

    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Matcher::Eq(expected) => match value {
                Some(v) => loose_eq(v, expected),
                None => expected.is_null(),
            },
            Matcher::In(list) => value.is_some_and(|v| list.iter().any(|m| loose_eq(v, m))),
            // "value absent from list": the original client had a double
            // negation here that made every record match.
            Matcher::NotIn(list) => value.is_none_or(|v| !list.iter().any(|m| loose_eq(v, m))),
            Matcher::Like(pattern) => value
                .and_then(Value::as_str)
                .is_some_and(|s| wildcard_match(pattern, s)),
            Matcher::Compare { op, value: rhs } => {
                let Some(v) = value else { return false };
                match op {
                    CompareOp::Eq => loose_eq(v, rhs),
                    CompareOp::Ne => !loose_eq(v, rhs),
                    ordered => match compare(v, rhs) {
                        Some(ord) => match ordered {
                            CompareOp::Gt => ord.is_gt(),
                            CompareOp::Ge => ord.is_ge(),
                            CompareOp::Lt => ord.is_lt(),
                            CompareOp::Le => ord.is_le(),
                            CompareOp::Eq | CompareOp::Ne => unreachable!(),
                        },
                        None => false,
                    },
                }
            }
            Matcher::Between(low, high) => {
                let Some(v) = value else { return false };
                matches!(compare(v, low), Some(ord) if ord.is_ge())
                    && matches!(compare(v, high), Some(ord) if ord.is_le())
            }
        }
    }
}

/// Loose equality: numbers compare by value (including numeric strings,
/// which the original wire format produces for version counters), all
/// other values compare structurally.
pub(crate) fn loose_eq(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Ordered comparison: numeric when both sides coerce to numbers,
/// lexicographic for strings, defined for booleans, undefined otherwise.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|_| !s.trim().is_empty()),
        _ => None,
    }
}

/// Case-insensitive wildcard match; `%` and `*` both match any run of
/// characters and the pattern covers the whole text.
pub(crate) fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();
    let segments: Vec<&str> = pattern.split(['%', '*']).collect();

    let leading_wild = pattern.starts_with(['%', '*']);
    let trailing_wild = pattern.ends_with(['%', '*']);

    let mut rest = text.as_str();
    let last_index = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        let anchored_start = i == 0 && !leading_wild;
        let anchored_end = i == last_index && !trailing_wild;
        if anchored_start {
            match rest.strip_prefix(segment) {
                Some(tail) => rest = tail,
                None => return false,
            }
            if anchored_end {
                return rest.is_empty();
            }
        } else if anchored_end {
            // The final literal must close the text; leftmost search
            // would consume an earlier occurrence.
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        serde_json::from_value(v).unwrap()
    }

    fn parses(v: Value) -> Condition {
        Condition::parse(&v).unwrap()
    }

    #[test]
    fn literal_equality_is_loose() {
        let cond = parses(json!({"version": "3"}));
        assert!(cond.matches(&rec(json!({"version": 3}))));
        assert!(!cond.matches(&rec(json!({"version": 4}))));
    }

    #[test]
    fn implicit_and_over_columns() {
        let cond = parses(json!({"a": 1, "b": "x"}));
        assert!(cond.matches(&rec(json!({"a": 1, "b": "x"}))));
        assert!(!cond.matches(&rec(json!({"a": 1, "b": "y"}))));
    }

    #[test]
    fn array_means_membership() {
        let cond = parses(json!({"status": ["open", "pending"]}));
        assert!(cond.matches(&rec(json!({"status": "pending"}))));
        assert!(!cond.matches(&rec(json!({"status": "closed"}))));
    }

    #[test]
    fn wildcard_patterns() {
        let cond = parses(json!({"name": "mar%"}));
        assert!(cond.matches(&rec(json!({"name": "Martin"}))));
        assert!(!cond.matches(&rec(json!({"name": "Omar"}))));

        let cond = parses(json!({"name": "%tin"}));
        assert!(cond.matches(&rec(json!({"name": "martin"}))));

        let cond = parses(json!({"name": "m*t*n"}));
        assert!(cond.matches(&rec(json!({"name": "mouton"}))));
        assert!(!cond.matches(&rec(json!({"name": "mouse"}))));

        // The trailing literal anchors to the end of the text even when
        // the same literal occurs earlier.
        let cond = parses(json!({"name": "a%b"}));
        assert!(cond.matches(&rec(json!({"name": "abxb"}))));
        assert!(!cond.matches(&rec(json!({"name": "abx"}))));
    }

    #[test]
    fn explicit_operators() {
        let cond = parses(json!({"age": {"ope": ">=", "value": 18}}));
        assert!(cond.matches(&rec(json!({"age": 18}))));
        assert!(!cond.matches(&rec(json!({"age": 17}))));

        let cond = parses(json!({"age": {"ope": "<>", "value": 18}}));
        assert!(cond.matches(&rec(json!({"age": 17}))));
        assert!(!cond.matches(&rec(json!({"age": 18}))));
    }

    #[test]
    fn between_is_inclusive_on_both_bounds() {
        let cond = parses(json!({"n": {"ope": "between", "value": [10, 20]}}));
        assert!(cond.matches(&rec(json!({"n": 10}))));
        assert!(cond.matches(&rec(json!({"n": 20}))));
        assert!(!cond.matches(&rec(json!({"n": 9}))));
        assert!(!cond.matches(&rec(json!({"n": 21}))));
    }

    #[test]
    fn not_in_rejects_member() {
        // Regression: the original evaluator's double negation made
        // "not in" match every record.
        let cond = parses(json!({"kind": {"ope": "not in", "value": ["a", "b"]}}));
        assert!(!cond.matches(&rec(json!({"kind": "a"}))));
        assert!(cond.matches(&rec(json!({"kind": "c"}))));
        assert!(cond.matches(&rec(json!({"other": 1}))));
    }

    #[test]
    fn or_and_composition_short_circuits() {
        let cond = parses(json!({
            "$or": [
                {"a": 1},
                {"$and": [{"b": 2}, {"c": 3}]}
            ]
        }));
        assert!(cond.matches(&rec(json!({"a": 1}))));
        assert!(cond.matches(&rec(json!({"b": 2, "c": 3}))));
        assert!(!cond.matches(&rec(json!({"b": 2, "c": 4}))));
    }

    #[test]
    fn unknown_operator_is_a_validation_error() {
        let err = Condition::parse(&json!({"a": {"ope": "~=", "value": 1}})).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));

        let err = Condition::parse(&json!({"a": {"value": 1}})).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[test]
    fn empty_condition_matches_everything() {
        let cond = parses(json!({}));
        assert!(cond.matches(&rec(json!({"anything": 1}))));
        assert!(cond.matches(&Record::new()));
    }

    // Property: the parsed evaluator agrees with a direct reference
    // evaluator over generated condition trees.

    #[derive(Debug, Clone)]
    enum RefCond {
        Eq(String, i64),
        Cmp(String, &'static str, i64),
        In(String, Vec<i64>),
        NotIn(String, Vec<i64>),
        Between(String, i64, i64),
        Or(Vec<RefCond>),
        And(Vec<RefCond>),
    }

    impl RefCond {
        fn to_json(&self) -> Value {
            match self {
                RefCond::Eq(c, v) => json!({ c.clone(): v }),
                RefCond::Cmp(c, op, v) => json!({ c.clone(): {"ope": op, "value": v} }),
                RefCond::In(c, vs) => json!({ c.clone(): {"ope": "in", "value": vs} }),
                RefCond::NotIn(c, vs) => json!({ c.clone(): {"ope": "not in", "value": vs} }),
                RefCond::Between(c, lo, hi) => {
                    json!({ c.clone(): {"ope": "between", "value": [lo, hi]} })
                }
                RefCond::Or(cs) => json!({"$or": cs.iter().map(RefCond::to_json).collect::<Vec<_>>()}),
                RefCond::And(cs) => {
                    json!({"$and": cs.iter().map(RefCond::to_json).collect::<Vec<_>>()})
                }
            }
        }

        fn eval(&self, record: &Record) -> bool {
            let get = |c: &str| record.get(c).and_then(Value::as_i64);
            match self {
                RefCond::Eq(c, v) => get(c) == Some(*v),
                RefCond::Cmp(c, op, v) => match get(c) {
                    None => false,
                    Some(x) => match *op {
                        ">" => x > *v,
                        ">=" => x >= *v,
                        "<" => x < *v,
                        "<=" => x <= *v,
                        "<>" => x != *v,
                        _ => unreachable!(),
                    },
                },
                RefCond::In(c, vs) => get(c).is_some_and(|x| vs.contains(&x)),
                RefCond::NotIn(c, vs) => !get(c).is_some_and(|x| vs.contains(&x)),
                RefCond::Between(c, lo, hi) => get(c).is_some_and(|x| x >= *lo && x <= *hi),
                RefCond::Or(cs) => cs.iter().any(|c| c.eval(record)),
                RefCond::And(cs) => cs.iter().all(|c| c.eval(record)),
            }
        }
    }

    fn arb_leaf() -> impl Strategy<Value = RefCond> {
        let col = prop::sample::select(vec!["a", "b", "c"]).prop_map(str::to_string);
        let val = -5i64..5;
        prop_oneof![
            (col.clone(), val.clone()).prop_map(|(c, v)| RefCond::Eq(c, v)),
            (
                col.clone(),
                prop::sample::select(vec![">", ">=", "<", "<=", "<>"]),
                val.clone()
            )
                .prop_map(|(c, op, v)| RefCond::Cmp(c, op, v)),
            (col.clone(), prop::collection::vec(val.clone(), 0..4))
                .prop_map(|(c, vs)| RefCond::In(c, vs)),
            (col.clone(), prop::collection::vec(val.clone(), 0..4))
                .prop_map(|(c, vs)| RefCond::NotIn(c, vs)),
            (col, val.clone(), val).prop_map(|(c, lo, hi)| {
                RefCond::Between(c, lo.min(hi), lo.max(hi))
            }),
        ]
    }

    fn arb_cond() -> impl Strategy<Value = RefCond> {
        arb_leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..4).prop_map(RefCond::Or),
                prop::collection::vec(inner, 1..4).prop_map(RefCond::And),
            ]
        })
    }

    proptest! {
        #[test]
        fn parsed_evaluator_agrees_with_reference(
            cond in arb_cond(),
            a in -5i64..5,
            b in -5i64..5,
            c in -5i64..5,
        ) {
            let record = rec(json!({"a": a, "b": b, "c": c}));
            let parsed = Condition::parse(&cond.to_json()).unwrap();
            prop_assert_eq!(parsed.matches(&record), cond.eval(&record));
        }
    }
}
