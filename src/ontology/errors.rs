//! Ontology error types

use thiserror::Error;

/// Result type for ontology mapping operations
pub type OntologyResult<T> = Result<T, OntologyError>;

/// Result type for target model parsing
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while loading or compiling an ontology mapping
#[derive(Debug, Error)]
pub enum OntologyError {
    #[error("Failed to load ontology mapping: {0}")]
    Load(String),

    #[error("Failed to parse ontology mapping: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid output DTMI filter '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Ontology mapping has not been loaded")]
    NotLoaded,

    #[error("I/O error reading ontology mapping: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while parsing target ontology model documents
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model document has an unexpected shape: {0}")]
    Shape(String),

    #[error("Model id is not a valid DTMI: {0}")]
    InvalidId(#[from] crate::value_objects::DtmiError),
}
