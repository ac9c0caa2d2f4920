// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use serde_json::{Map, Value};
use std::collections::HashMap;

/// A partial update returned by a node: field name to new value
pub type StateUpdate = Map<String, Value>;

/// Convenience for building a partial update from literal pairs
pub fn partial<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> StateUpdate {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Compute the new value of a bounded, ordered sequence field: the current
/// array under `key` with `value` appended, trimmed to the last
/// `keep_last` entries. Nodes use this to maintain history explicitly
/// instead of accumulating without bound.
pub fn appended(state: &StateStore, key: &str, value: Value, keep_last: usize) -> Value {
    let mut entries: Vec<Value> = match state.get(key) {
        Some(Value::Array(existing)) => existing.clone(),
        _ => Vec::new(),
    };
    entries.push(value);
    if entries.len() > keep_last {
        entries.drain(..entries.len() - keep_last);
    }
    Value::Array(entries)
}

/// The shared working memory of a workflow run.
///
/// Field presence is never required a priori: nodes must tolerate absent
/// fields. Once set, a field is only changed by a later update that names
/// it. The store is owned and mutated exclusively by the engine's run
/// loop; nodes see a read view.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    fields: HashMap<String, Value>,
}

impl StateStore {
    /// Create an empty StateStore
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a StateStore seeded with initial fields
    pub fn seeded(seed: StateUpdate) -> Self {
        let mut store = Self::empty();
        store.merge(seed);
        store
    }

    /// Apply a partial update: each key in `update` overwrites the stored
    /// value for that key; keys not present are left untouched. Unknown
    /// keys are simply stored.
    pub fn merge(&mut self, update: StateUpdate) {
        for (key, value) in update {
            self.fields.insert(key, value);
        }
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field as a string slice
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    /// Get a field as an unsigned integer
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.as_u64())
    }

    /// Get a field as a boolean
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// Whether a field is present with a meaningful value: set, non-null,
    /// and non-empty if it is a string
    pub fn is_set(&self, key: &str) -> bool {
        match self.fields.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// Snapshot the store as a JSON object, for diagnostics and logging
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// All field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}
