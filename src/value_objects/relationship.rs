use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A directed, named edge between two twins
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "$relationshipId", default)]
    pub id: String,

    #[serde(rename = "$relationshipName", default)]
    pub name: String,

    #[serde(rename = "$sourceId", default)]
    pub source_id: String,

    #[serde(rename = "$targetId", default)]
    pub target_id: String,

    #[serde(flatten)]
    pub properties: IndexMap<String, Value>,
}

impl Relationship {
    /// Build a relationship whose id is derived from its endpoints and name
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let source_id = source_id.into();
        let target_id = target_id.into();
        let name = name.into();
        Self {
            id: Self::derive_id(&source_id, &target_id, &name),
            name,
            source_id,
            target_id,
            properties: IndexMap::new(),
        }
    }

    /// Deterministic relationship id: `{source}-{target}-{name}`
    pub fn derive_id(source_id: &str, target_id: &str, name: &str) -> String {
        format!("{source_id}-{target_id}-{name}")
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// True if either endpoint is the given twin
    pub fn touches(&self, twin_id: &str) -> bool {
        self.source_id == twin_id || self.target_id == twin_id
    }
}
