use serde::{Deserialize, Serialize};
use std::fmt;

/// Review state of a staged twin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MappedEntryStatus {
    #[default]
    Pending,
    Approved,
    Ignore,
    Created,
}

impl MappedEntryStatus {
    /// An approved or already-created entry lets the twin be materialised
    pub fn allows_creation(&self) -> bool {
        matches!(self, Self::Approved | Self::Created)
    }
}

impl fmt::Display for MappedEntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Ignore => "Ignore",
            Self::Created => "Created",
        };
        f.write_str(s)
    }
}

/// A staging record as read back from the mapping store
///
/// Operators may override the model id, the name and the twin id of the twin
/// that will be created for the entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedEntry {
    pub mapped_id: String,

    #[serde(default)]
    pub willow_id: Option<String>,

    #[serde(default)]
    pub willow_model_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub status: MappedEntryStatus,
}

impl MappedEntry {
    /// Twin id chosen by the operator, ignoring blank and `-` placeholders
    pub fn willow_id_override(&self) -> Option<&str> {
        self.willow_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != "-")
    }
}

/// Payload written to the mapping store on create and update
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedEntryRecord {
    pub description: String,
    pub mapped_model_id: String,
    pub name: String,
    pub willow_model_id: String,
    pub status: MappedEntryStatus,
    pub mapped_id: String,
    pub parent_mapped_id: String,
    pub parent_willow_id: String,
    pub willow_parent_rel: Option<String>,
    pub connector_id: String,
    pub willow_id: String,
    pub building_id: String,
    pub unit: String,
    pub data_type: String,
}
