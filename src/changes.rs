//! Change tracking: old/new value pairs recorded while marshaling.

use crate::value::Value;
use serde_json::{json, Map, Value as Json};
use std::collections::btree_map;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// `None` when the attribute had no value before marshaling.
    pub old_value: Option<Value>,
    pub new_value: Value,
}

/// Field name → [`Change`] for every field whose value differed after marshaling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes(BTreeMap<String, Change>);

impl Changes {
    /// Record `name` only when `new_value` differs from `old_value`.
    pub(crate) fn record(&mut self, name: &str, old_value: Option<Value>, new_value: Value) {
        if old_value.as_ref() == Some(&new_value) {
            return;
        }
        self.0.insert(name.to_string(), Change { old_value, new_value });
    }

    pub(crate) fn merge(&mut self, other: Changes) {
        self.0.extend(other.0);
    }

    pub fn get(&self, name: &str) -> Option<&Change> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Change> {
        self.0.iter()
    }

    /// Render as `{name: {"old_value": .., "new_value": ..}}`.
    pub fn to_json(&self) -> Json {
        let map: Map<String, Json> = self
            .0
            .iter()
            .map(|(name, c)| {
                let old = c.old_value.as_ref().map(Value::to_json).unwrap_or(Json::Null);
                (name.clone(), json!({"old_value": old, "new_value": c.new_value.to_json()}))
            })
            .collect();
        Json::Object(map)
    }
}

impl<'a> IntoIterator for &'a Changes {
    type Item = (&'a String, &'a Change);
    type IntoIter = btree_map::Iter<'a, String, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
