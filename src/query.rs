//! Typed query filters over JSON documents.
//!
//! A [`Query`] maps field names to a closed set of comparison predicates.
//! Fields without an explicit operator use exact-match semantics. The
//! serialized form of a query is canonical (fields in lexicographic order),
//! which makes it usable as a cache-key fingerprint.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;

use crate::storage::Document;

/// A single-field comparison predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equals(Value),
    NotEquals(Value),
    GreaterThan(Value),
    GreaterOrEqual(Value),
    LessThan(Value),
    LessOrEqual(Value),
}

impl Predicate {
    fn matches(&self, field_value: Option<&Value>) -> bool {
        match self {
            Predicate::Equals(expected) => field_value == Some(expected),
            // A missing field is "not equal" to any concrete value.
            Predicate::NotEquals(expected) => field_value != Some(expected),
            Predicate::GreaterThan(bound) => {
                matches!(compare_values(field_value, Some(bound)), Some(Ordering::Greater))
            }
            Predicate::GreaterOrEqual(bound) => matches!(
                compare_values(field_value, Some(bound)),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            Predicate::LessThan(bound) => {
                matches!(compare_values(field_value, Some(bound)), Some(Ordering::Less))
            }
            Predicate::LessOrEqual(bound) => matches!(
                compare_values(field_value, Some(bound)),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
        }
    }

    /// The wire-shaped JSON form of this predicate, used in fingerprints.
    fn to_value(&self) -> Value {
        fn op(name: &str, value: &Value) -> Value {
            let mut map = serde_json::Map::new();
            map.insert(name.to_string(), value.clone());
            Value::Object(map)
        }
        match self {
            Predicate::Equals(v) => v.clone(),
            Predicate::NotEquals(v) => op("$ne", v),
            Predicate::GreaterThan(v) => op("$gt", v),
            Predicate::GreaterOrEqual(v) => op("$gte", v),
            Predicate::LessThan(v) => op("$lt", v),
            Predicate::LessOrEqual(v) => op("$lte", v),
        }
    }
}

/// Ordered comparison between two optional JSON values.
///
/// Numbers compare numerically, strings lexicographically; a missing value
/// sorts before any present one. Mixed-type comparisons have no ordering.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Option<Ordering> {
    match (a, b) {
        (None, None) => Some(Ordering::Equal),
        (None, Some(_)) => Some(Ordering::Less),
        (Some(_), None) => Some(Ordering::Greater),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            a.as_f64().partial_cmp(&b.as_f64())
        }
        (Some(Value::String(a)), Some(Value::String(b))) => Some(a.cmp(b)),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => Some(a.cmp(b)),
        _ => None,
    }
}

/// A field-to-predicate filter with exact-match defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    fields: BTreeMap<String, Predicate>,
}

impl Query {
    /// An empty query, matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for an exact match on the synthetic `_id` field.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().eq("_id", Value::String(id.into()))
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), Predicate::Equals(value.into()));
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), Predicate::NotEquals(value.into()));
        self
    }

    pub fn gt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), Predicate::GreaterThan(value.into()));
        self
    }

    pub fn gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .insert(field.into(), Predicate::GreaterOrEqual(value.into()));
        self
    }

    pub fn lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), Predicate::LessThan(value.into()));
        self
    }

    pub fn lte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .insert(field.into(), Predicate::LessOrEqual(value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether every predicate holds against `doc`.
    pub fn matches(&self, doc: &Document) -> bool {
        self.fields
            .iter()
            .all(|(field, predicate)| predicate.matches(doc.get(field)))
    }

    /// Canonical serialization of this query, stable across construction
    /// order. Combined with the collection name it identifies a cache slot.
    pub fn fingerprint(&self) -> String {
        let mut map = serde_json::Map::new();
        for (field, predicate) in &self.fields {
            map.insert(field.clone(), predicate.to_value());
        }
        Value::Object(map).to_string()
    }
}

/// Sort direction for [`FindOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Caller-supplied ordering and truncation for multi-document reads.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((field.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Apply sort then limit to a materialized result sequence. Idempotent,
    /// so it is safe to run both in a backend and again in the facade.
    pub fn apply(&self, docs: &mut Vec<Document>) {
        if let Some((field, order)) = &self.sort {
            docs.sort_by(|a, b| {
                let ordering =
                    compare_values(a.get(field), b.get(field)).unwrap_or(Ordering::Equal);
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn exact_match() {
        let query = Query::new().eq("name", "alice");
        assert!(query.matches(&doc(json!({"name": "alice", "age": 30}))));
        assert!(!query.matches(&doc(json!({"name": "bob"}))));
        assert!(!query.matches(&doc(json!({"age": 30}))));
    }

    #[test]
    fn not_equals_matches_missing_field() {
        let query = Query::new().ne("name", "alice");
        assert!(query.matches(&doc(json!({"name": "bob"}))));
        assert!(query.matches(&doc(json!({"age": 30}))));
        assert!(!query.matches(&doc(json!({"name": "alice"}))));
    }

    #[test]
    fn numeric_comparisons() {
        let query = Query::new().gt("age", 21).lte("age", 65);
        assert!(query.matches(&doc(json!({"age": 22}))));
        assert!(query.matches(&doc(json!({"age": 65}))));
        assert!(!query.matches(&doc(json!({"age": 21}))));
        assert!(!query.matches(&doc(json!({"age": 66}))));
        // A missing or mistyped field never satisfies an ordered predicate.
        assert!(!query.matches(&doc(json!({}))));
        assert!(!query.matches(&doc(json!({"age": "old"}))));
    }

    #[test]
    fn string_comparisons_are_lexicographic() {
        let query = Query::new().lt("name", "m");
        assert!(query.matches(&doc(json!({"name": "alice"}))));
        assert!(!query.matches(&doc(json!({"name": "zoe"}))));
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(Query::new().matches(&doc(json!({"anything": 1}))));
        assert!(Query::new().matches(&doc(json!({}))));
    }

    #[test]
    fn fingerprint_is_canonical() {
        let a = Query::new().eq("name", "alice").gt("age", 21);
        let b = Query::new().gt("age", 21).eq("name", "alice");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), r#"{"age":{"$gt":21},"name":"alice"}"#);
    }

    #[test]
    fn fingerprint_distinguishes_operators() {
        let eq = Query::new().eq("age", 21);
        let gte = Query::new().gte("age", 21);
        assert_ne!(eq.fingerprint(), gte.fingerprint());
    }

    #[test]
    fn options_sort_and_limit() {
        let mut docs = vec![
            doc(json!({"rank": 3})),
            doc(json!({"rank": 1})),
            doc(json!({"rank": 2})),
        ];
        FindOptions::default()
            .sort("rank", SortOrder::Descending)
            .limit(2)
            .apply(&mut docs);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["rank"], json!(3));
        assert_eq!(docs[1]["rank"], json!(2));
    }
}
