//! Tolerant field-by-field decoding of JSON objects
//!
//! Every decoder is a total function from a JSON value to `Option<T>`: a value
//! of the wrong shape yields `None` and the field keeps its default, so one bad
//! key never fails the whole document. String values pass through the active
//! [`Transform`] on the way out.

use crate::substitute::Transform;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// A JSON object paired with the transform applied to its string values
#[derive(Clone, Copy)]
pub struct Fields<'a> {
    map: &'a Map<String, Value>,
    transform: &'a Transform,
}

impl<'a> Fields<'a> {
    pub fn new(map: &'a Map<String, Value>, transform: &'a Transform) -> Self {
        Self { map, transform }
    }

    pub fn transform(&self) -> &'a Transform {
        self.transform
    }

    /// The raw value at `key`, without substitution
    pub fn raw(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key)
    }

    /// Decode `key` with an arbitrary value decoder
    pub fn get<T>(&self, key: &str, decode: impl Fn(&'a Value, &'a Transform) -> Option<T>) -> Option<T> {
        self.raw(key).and_then(|v| decode(v, self.transform))
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.get(key, string)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.raw(key).and_then(Value::as_bool)
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.raw(key).and_then(Value::as_u64)
    }

    /// Array of strings; absent or mismatched yields an empty list
    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.get(key, string_list).unwrap_or_default()
    }

    /// A single string or an array of strings
    pub fn string_or_list(&self, key: &str) -> Vec<String> {
        self.get(key, string_or_list).unwrap_or_default()
    }

    /// Object of string values; absent or mismatched yields an empty map
    pub fn string_map(&self, key: &str) -> IndexMap<String, String> {
        self.get(key, string_map).unwrap_or_default()
    }

    /// Case-insensitive enum lookup with an explicit default
    pub fn enumeration<E: Copy>(&self, key: &str, table: &[(&str, E)], default: E) -> E {
        self.string(key)
            .and_then(|s| lookup_enum(&s, table))
            .unwrap_or(default)
    }

    /// Nested object at `key`, sharing this transform
    pub fn object(&self, key: &str) -> Option<Fields<'a>> {
        match self.raw(key) {
            Some(Value::Object(map)) => Some(Fields::new(map, self.transform)),
            _ => None,
        }
    }

    /// Raw nested object at `key`
    pub fn raw_object(&self, key: &str) -> Option<&'a Map<String, Value>> {
        self.raw(key).and_then(Value::as_object)
    }

    /// Iterate object entries at `key` as `(name, value)` pairs
    pub fn entries(&self, key: &str) -> impl Iterator<Item = (&'a String, &'a Value)> {
        self.raw_object(key).into_iter().flat_map(|m| m.iter())
    }
}

pub fn string(value: &Value, transform: &Transform) -> Option<String> {
    value.as_str().map(|s| transform.apply(s))
}

/// Array of strings; non-string elements are dropped
pub fn string_list(value: &Value, transform: &Transform) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|item| string(item, transform))
            .collect()
    })
}

pub fn string_or_list(value: &Value, transform: &Transform) -> Option<Vec<String>> {
    match value {
        Value::String(_) => string(value, transform).map(|s| vec![s]),
        Value::Array(_) => string_list(value, transform),
        _ => None,
    }
}

/// Object of string values; non-string values are dropped
pub fn string_map(value: &Value, transform: &Transform) -> Option<IndexMap<String, String>> {
    value.as_object().map(|map| {
        map.iter()
            .filter_map(|(k, v)| string(v, transform).map(|s| (k.clone(), s)))
            .collect()
    })
}

/// Object of optional strings: `null` maps to `None`, other shapes are dropped
pub fn nullable_string_map(
    value: &Value,
    transform: &Transform,
) -> Option<IndexMap<String, Option<String>>> {
    value.as_object().map(|map| {
        map.iter()
            .filter_map(|(k, v)| match v {
                Value::Null => Some((k.clone(), None)),
                Value::String(_) => string(v, transform).map(|s| (k.clone(), Some(s))),
                _ => None,
            })
            .collect()
    })
}

/// Number or string, rendered as a string
pub fn scalar_string(value: &Value, transform: &Transform) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(_) => string(value, transform),
        _ => None,
    }
}

pub fn lookup_enum<E: Copy>(text: &str, table: &[(&str, E)]) -> Option<E> {
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(text))
        .map(|(_, value)| *value)
}
