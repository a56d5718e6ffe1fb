//! The tagged variable model: strings, indexed arrays and associative
//! arrays, each with attribute bits.
//!
//! Indexed arrays are sparse (a `BTreeMap` keyed by index, iterated in
//! index order); associative arrays preserve insertion order via
//! `IndexMap`, and re-assigning an existing key keeps its position.

use std::collections::BTreeMap;

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Indexed(BTreeMap<i64, String>),
    Assoc(IndexMap<String, String>),
}

impl Value {
    pub fn indexed_from(items: Vec<String>) -> Self {
        Value::Indexed(items.into_iter().enumerate().map(|(i, v)| (i as i64, v)).collect())
    }

    /// The scalar view: element 0 of an array, the string itself otherwise.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Indexed(map) => map.get(&0).map(|s| s.as_str()),
            Value::Assoc(map) => map.get("0").map(|s| s.as_str()),
        }
    }

    /// All elements in order, for `${a[@]}`.
    pub fn elements(&self) -> Vec<String> {
        match self {
            Value::String(s) => vec![s.clone()],
            Value::Indexed(map) => map.values().cloned().collect(),
            Value::Assoc(map) => map.values().cloned().collect(),
        }
    }

    /// All keys in order, for `${!a[@]}`.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::String(_) => vec!["0".to_string()],
            Value::Indexed(map) => map.keys().map(|k| k.to_string()).collect(),
            Value::Assoc(map) => map.keys().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Value::String(_) => 1,
            Value::Indexed(map) => map.len(),
            Value::Assoc(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attributes {
    pub readonly: bool,
    pub exported: bool,
    /// Assignments are evaluated arithmetically.
    pub integer: bool,
    /// Force case on store.
    pub lowercase: bool,
    pub uppercase: bool,
    /// Indirect reference: the value names the real variable.
    pub nameref: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: Value,
    pub attrs: Attributes,
}

impl Variable {
    pub fn string(value: impl Into<String>) -> Self {
        Variable { value: Value::String(value.into()), attrs: Attributes::default() }
    }

    pub fn exported(value: impl Into<String>) -> Self {
        Variable {
            value: Value::String(value.into()),
            attrs: Attributes { exported: true, ..Attributes::default() },
        }
    }

    /// Apply case-forcing attributes to a value being stored.
    pub fn coerce_case(&self, value: String) -> String {
        if self.attrs.uppercase {
            value.to_uppercase()
        } else if self.attrs.lowercase {
            value.to_lowercase()
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_view_of_array() {
        let v = Value::indexed_from(vec!["a".into(), "b".into()]);
        assert_eq!(v.as_scalar(), Some("a"));
        assert_eq!(v.elements(), vec!["a", "b"]);
        assert_eq!(v.keys(), vec!["0", "1"]);
    }

    #[test]
    fn sparse_indexed_order() {
        let mut map = BTreeMap::new();
        map.insert(5i64, "five".to_string());
        map.insert(1i64, "one".to_string());
        let v = Value::Indexed(map);
        assert_eq!(v.elements(), vec!["one", "five"]);
        assert_eq!(v.keys(), vec!["1", "5"]);
    }

    #[test]
    fn assoc_preserves_insertion_order() {
        let mut map = IndexMap::new();
        map.insert("z".to_string(), "1".to_string());
        map.insert("a".to_string(), "2".to_string());
        // Re-assignment keeps position.
        map.insert("z".to_string(), "3".to_string());
        let v = Value::Assoc(map);
        assert_eq!(v.keys(), vec!["z", "a"]);
        assert_eq!(v.elements(), vec!["3", "2"]);
    }

    #[test]
    fn case_coercion() {
        let mut var = Variable::string("x");
        var.attrs.uppercase = true;
        assert_eq!(var.coerce_case("hello".into()), "HELLO");
    }
}
