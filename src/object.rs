//! In-memory objects
//!
//! An `Entity` is one stored object: its type, ids, timestamps and field map,
//! plus change tracking so a save only writes what actually changed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{ADDED_COLUMN, UPDATED_COLUMN};

/// A stored object of some declared type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: Option<u64>,
    pub parent_id: Option<u64>,
    pub creator_id: Option<u64>,
    #[serde(rename = "_added")]
    pub added: Option<String>,
    #[serde(rename = "_updated")]
    pub updated: Option<String>,
    data: Map<String, Value>,
    /// Original value of every changed key (`None` when it was absent)
    #[serde(skip)]
    changes: BTreeMap<String, Option<Value>>,
}

impl Entity {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: None,
            parent_id: None,
            creator_id: None,
            added: None,
            updated: None,
            data: Map::new(),
            changes: BTreeMap::new(),
        }
    }

    /// Build a clean (unchanged) entity from a flat record such as a cache
    /// snapshot or a view row
    pub fn from_record(type_name: impl Into<String>, record: Map<String, Value>) -> Self {
        let mut entity = Self::new(type_name);
        for (key, value) in record {
            match key.as_str() {
                "id" => entity.id = value_to_u64(&value),
                "parent_id" => entity.parent_id = value_to_u64(&value),
                "creator_id" => entity.creator_id = value_to_u64(&value),
                ADDED_COLUMN => entity.added = value_to_string(&value),
                UPDATED_COLUMN => entity.updated = value_to_string(&value),
                _ => {
                    entity.data.insert(key, value);
                }
            }
        }
        entity
    }

    /// Flat record of the field map plus ids and timestamps
    pub fn to_record(&self) -> Map<String, Value> {
        let mut record = self.data.clone();
        record.insert("id".to_string(), self.id.map(Value::from).unwrap_or(Value::Null));
        record.insert("parent_id".to_string(), self.parent_id.map(Value::from).unwrap_or(Value::Null));
        record.insert("creator_id".to_string(), self.creator_id.map(Value::from).unwrap_or(Value::Null));
        record.insert(
            ADDED_COLUMN.to_string(),
            self.added.clone().map(Value::from).unwrap_or(Value::Null),
        );
        record.insert(
            UPDATED_COLUMN.to_string(),
            self.updated.clone().map(Value::from).unwrap_or(Value::Null),
        );
        record
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Set a field; setting it back to its original value clears the change
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        self.record_original(&key);
        self.data.insert(key.clone(), value);
        self.settle(&key);
        self
    }

    /// Remove a field; it counts as changed if it was present before
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.record_original(key);
        let removed = self.data.remove(key);
        self.settle(key);
        removed
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    fn record_original(&mut self, key: &str) {
        if !self.changes.contains_key(key) {
            self.changes.insert(key.to_string(), self.data.get(key).cloned());
        }
    }

    fn settle(&mut self, key: &str) {
        if self.changes.get(key).is_some_and(|original| original.as_ref() == self.data.get(key)) {
            self.changes.remove(key);
        }
    }

    pub fn is_changed(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn changed_keys(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn is_key_changed(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    /// Accept the current field map as the clean state
    pub fn reset_changes(&mut self) {
        self.changes.clear();
    }
}

/// A directed relation between two objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub origin_id: u64,
    pub target_id: u64,
    pub added: Option<String>,
}

/// Read an id from a JSON number or numeric string
pub(crate) fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
