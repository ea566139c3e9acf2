//! Insertion-ordered log record.
//!
//! Field order is part of the output contract: operators rely on
//! timestamp/level/message coming first, so serialization never sorts keys.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

/// A structured log line: unique string keys, string values, first-insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedRecord {
    fields: IndexMap<String, String>,
}

impl OrderedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a field. Updating never moves the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Apply `set` for every pair, in the iteration order of `pairs`.
    pub fn merge<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in pairs {
            self.set(key, value);
        }
    }

    /// Remove a field, keeping the relative order of the rest.
    pub fn delete(&mut self, key: &str) -> Option<String> {
        self.fields.shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Compact JSON object with keys in insertion order.
    pub fn to_json(&self) -> String {
        // A map of strings always serializes
        serde_json::to_string(&self.fields).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Serialize for OrderedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OrderedRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = OrderedRecord::new();
        record.merge(iter);
        record
    }
}
