use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Per-entity failures collected during a sync, keyed by twin or relationship id
///
/// Only the first message recorded for an id is kept.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncErrors(IndexMap<String, String>);

impl SyncErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure; returns false if the id already had one
    pub fn record(&mut self, id: impl Into<String>, message: impl Into<String>) -> bool {
        let id = id.into();
        if self.0.contains_key(&id) {
            return false;
        }
        self.0.insert(id, message.into());
        true
    }

    /// Fold another error set into this one, keeping existing messages
    pub fn merge(&mut self, other: SyncErrors) {
        for (id, message) in other.0 {
            self.record(id, message);
        }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
