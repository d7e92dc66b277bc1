use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered property map of a twin
pub type TwinContents = IndexMap<String, Value>;

/// Twin metadata block (`$metadata`)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TwinMetadata {
    /// Model id of the twin; empty when not yet assigned
    #[serde(rename = "$model", default)]
    pub model_id: String,
}

/// A node of the target digital twin graph
///
/// Serializes to the store's wire shape: `$dtId`, `$metadata.$model` and the
/// contents flattened at the top level.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Twin {
    #[serde(rename = "$dtId", default)]
    pub id: String,

    #[serde(rename = "$metadata", default)]
    pub metadata: TwinMetadata,

    #[serde(flatten)]
    pub contents: TwinContents,
}

impl Twin {
    /// Create an empty twin of the given model
    pub fn new(id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: TwinMetadata {
                model_id: model_id.into(),
            },
            contents: TwinContents::new(),
        }
    }

    /// Builder-style content insertion
    pub fn with_content(mut self, key: impl Into<String>, value: Value) -> Self {
        self.contents.insert(key.into(), value);
        self
    }

    pub fn model_id(&self) -> &str {
        &self.metadata.model_id
    }

    /// String view of a content value; non-string values are rendered as JSON
    pub fn content_string(&self, key: &str) -> Option<String> {
        match self.contents.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}
