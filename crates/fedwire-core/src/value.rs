//! # Typed Field Values and the Extension Bag
//!
//! [`FieldValue`] is the value type of the entity payload mapping.
//! [`ExtensionBag`] holds protocol fields the canonical schema does not model,
//! so round-tripping through the engine never silently drops data.
//!
//! Both use `BTreeMap`, so field order never affects equality or
//! serialization.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::temporal::Timestamp;

/// A typed value in an entity payload mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Explicitly absent.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Double-precision float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// UTC timestamp.
    Timestamp(Timestamp),
    /// Ordered list.
    List(Vec<FieldValue>),
    /// Nested mapping.
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Name of the value kind, used in `TypeMismatch` errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Number of values in this value, counting itself and every nested value.
    pub fn entry_count(&self) -> usize {
        match self {
            Self::List(items) => 1 + items.iter().map(Self::entry_count).sum::<usize>(),
            Self::Map(map) => 1 + map.values().map(Self::entry_count).sum::<usize>(),
            _ => 1,
        }
    }

    /// Nesting depth; scalars have depth 1.
    pub fn depth(&self) -> usize {
        match self {
            Self::List(items) => 1 + items.iter().map(Self::depth).max().unwrap_or(0),
            Self::Map(map) => 1 + map.values().map(Self::depth).max().unwrap_or(0),
            _ => 1,
        }
    }

    /// Approximate encoded size in bytes.
    pub fn approx_size(&self) -> usize {
        match self {
            Self::Null | Self::Bool(_) => 5,
            Self::Integer(_) | Self::Float(_) => 8,
            Self::Text(s) => s.len(),
            Self::Timestamp(_) => 20,
            Self::List(items) => items.iter().map(Self::approx_size).sum(),
            Self::Map(map) => map.iter().map(|(k, v)| k.len() + v.approx_size()).sum(),
        }
    }

    /// Whether every float in the value is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(f) => f.is_finite(),
            Self::List(items) => items.iter().all(Self::is_finite),
            Self::Map(map) => map.values().all(Self::is_finite),
            _ => true,
        }
    }

    /// Plain JSON rendering: timestamps become ISO 8601 strings, non-finite
    /// floats become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(n) => Value::from(*n),
            Self::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::Timestamp(ts) => Value::String(ts.to_iso8601()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
        }
    }

    /// Interpret plain JSON. Integral numbers that fit `i64` become
    /// `Integer`, other numbers `Float`; strings stay `Text`.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(map.iter().map(|(k, v)| (k.clone(), Self::from_json(v))).collect()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(ts: Timestamp) -> Self {
        Self::Timestamp(ts)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Mapping from field name to typed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionBag(BTreeMap<String, FieldValue>);

impl ExtensionBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, returning the previous value under that name.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder form of [`ExtensionBag::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Total number of values, nested values included.
    pub fn entry_count(&self) -> usize {
        self.0.values().map(FieldValue::entry_count).sum()
    }

    /// Approximate encoded size in bytes, keys included.
    pub fn approx_size(&self) -> usize {
        self.0.iter().map(|(k, v)| k.len() + v.approx_size()).sum()
    }

    /// Deepest value nesting; an empty bag has depth 0.
    pub fn depth(&self) -> usize {
        self.0.values().map(FieldValue::depth).max().unwrap_or(0)
    }

    /// Plain JSON object rendering of the bag.
    pub fn to_json(&self) -> Value {
        Value::Object(self.to_json_map())
    }

    pub fn to_json_map(&self) -> Map<String, Value> {
        self.0.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
    }

    pub fn into_inner(self) -> BTreeMap<String, FieldValue> {
        self.0
    }
}

impl From<BTreeMap<String, FieldValue>> for ExtensionBag {
    fn from(map: BTreeMap<String, FieldValue>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, FieldValue)> for ExtensionBag {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ExtensionBag {
    type Item = (String, FieldValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for ExtensionBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> FieldValue {
        let mut inner = BTreeMap::new();
        inner.insert("k".to_string(), FieldValue::List(vec![FieldValue::Integer(1), FieldValue::Null]));
        FieldValue::Map(inner)
    }

    #[test]
    fn test_entry_count_and_depth() {
        let v = nested();
        assert_eq!(v.entry_count(), 4);
        assert_eq!(v.depth(), 3);
        assert_eq!(FieldValue::Text("x".into()).depth(), 1);
    }

    #[test]
    fn test_bag_order_independent_equality() {
        let a = ExtensionBag::new().with("b", 1i64).with("a", "x");
        let b = ExtensionBag::new().with("a", "x").with("b", 1i64);
        assert_eq!(a, b);
        assert_eq!(a.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_json_mapping() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let bag = ExtensionBag::new()
            .with("when", ts)
            .with("n", 3i64)
            .with("nested", nested());
        assert_eq!(
            bag.to_json(),
            serde_json::json!({"when": "2026-01-15T12:00:00Z", "n": 3, "nested": {"k": [1, null]}})
        );
    }

    #[test]
    fn test_from_json_number_kinds() {
        assert_eq!(FieldValue::from_json(&serde_json::json!(7)), FieldValue::Integer(7));
        assert_eq!(FieldValue::from_json(&serde_json::json!(2.5)), FieldValue::Float(2.5));
        assert!(matches!(
            FieldValue::from_json(&serde_json::json!(u64::MAX)),
            FieldValue::Float(_)
        ));
    }

    #[test]
    fn test_non_finite_detection() {
        assert!(!FieldValue::List(vec![FieldValue::Float(f64::NAN)]).is_finite());
        assert!(FieldValue::Float(1.0).is_finite());
        assert_eq!(FieldValue::Float(f64::INFINITY).to_json(), Value::Null);
    }

    #[test]
    fn test_bag_size_metrics() {
        let bag = ExtensionBag::new().with("ab", "xyz").with("c", nested());
        assert_eq!(bag.entry_count(), 5);
        assert_eq!(bag.approx_size(), 2 + 3 + 1 + (1 + 8 + 5));
        assert_eq!(bag.depth(), 3);
    }
}
