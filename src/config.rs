//! Ingestion options

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse options: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read options: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid option {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Patch paths applied to existing twins without operator review
pub const DEFAULT_AUTO_PATCH_PROPERTIES: [&str; 9] = [
    "/alternateClassification",
    "/externalID",
    "/externalIds",
    "/externalIds/mappingKeys",
    "/mappedConnectorId",
    "/mappedIds",
    "/stateText",
    "/type",
    "/valueMap",
];

/// Options controlling sync and reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestionOptions {
    /// Diff and update twins that already exist in the store
    pub enable_updates: bool,

    /// Delete a duplicate twin stored under the mapped id before creating an approved one
    pub enable_twin_replace: bool,

    /// Send auto-patchable changes as a patch instead of a whole-twin update
    pub prefer_patch: bool,

    pub thing_query_batch_size: usize,

    pub twin_batch_size: usize,

    pub mapped_entry_page_size: usize,

    pub auto_patch_properties: Vec<String>,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            enable_updates: true,
            enable_twin_replace: false,
            prefer_patch: false,
            thing_query_batch_size: 100,
            twin_batch_size: 50,
            mapped_entry_page_size: 100,
            auto_patch_properties: DEFAULT_AUTO_PATCH_PROPERTIES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl IngestionOptions {
    /// Parse and validate options from JSON text; absent fields take their defaults
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let sizes = [
            ("thingQueryBatchSize", self.thing_query_batch_size),
            ("twinBatchSize", self.twin_batch_size),
            ("mappedEntryPageSize", self.mapped_entry_page_size),
        ];
        for (field, size) in sizes {
            if size == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if let Some(path) = self
            .auto_patch_properties
            .iter()
            .find(|path| !path.starts_with('/'))
        {
            return Err(ConfigError::Invalid {
                field: "autoPatchProperties",
                reason: format!("'{path}' is not a JSON pointer"),
            });
        }

        Ok(())
    }
}
