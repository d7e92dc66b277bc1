//! Ontology mapping sources

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use super::errors::OntologyResult;
use super::mapping::OntologyMapping;

/// Source of the ontology mapping document
#[async_trait]
pub trait OntologyMappingLoader: Send + Sync {
    /// Fetch and parse the mapping document
    async fn load_ontology_mapping(&self) -> OntologyResult<OntologyMapping>;
}

/// Reads the mapping document from a JSON file
pub struct FileOntologyMappingLoader {
    path: PathBuf,
}

impl FileOntologyMappingLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl OntologyMappingLoader for FileOntologyMappingLoader {
    async fn load_ontology_mapping(&self) -> OntologyResult<OntologyMapping> {
        debug!(path = %self.path.display(), "Reading ontology mapping");
        let text = tokio::fs::read_to_string(&self.path).await?;
        Ok(OntologyMapping::from_json_str(&text)?)
    }
}

/// Serves an already-built mapping document
pub struct StaticOntologyMappingLoader {
    mapping: OntologyMapping,
}

impl StaticOntologyMappingLoader {
    pub fn new(mapping: OntologyMapping) -> Self {
        Self { mapping }
    }

    pub fn from_json_str(json: &str) -> OntologyResult<Self> {
        Ok(Self::new(OntologyMapping::from_json_str(json)?))
    }
}

#[async_trait]
impl OntologyMappingLoader for StaticOntologyMappingLoader {
    async fn load_ontology_mapping(&self) -> OntologyResult<OntologyMapping> {
        Ok(self.mapping.clone())
    }
}
