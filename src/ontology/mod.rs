//! Ontology mapping
//!
//! Translates source-ontology types, relationships and properties into the
//! target ontology, and describes the target ontology's model hierarchy.

mod errors;
mod loader;
mod manager;
mod mapping;
mod rules;
mod target_model;

pub use errors::{ModelError, ModelResult, OntologyError, OntologyResult};
pub use loader::{FileOntologyMappingLoader, OntologyMappingLoader, StaticOntologyMappingLoader};
pub use manager::{LoadedOntologyMapping, OntologyMappingManager};
pub use mapping::{
    FillProperty, InterfaceRemap, MappingHeader, ObjectTransformation, OntologyMapping,
    OntologyReference, PropertyProjection, RelationshipRemap,
};
pub use rules::{DtmiFilter, PropertyRule, RuleKind, RuleOutcome, RuleTable};
pub use target_model::{ModelInterface, TargetModelSet, CAPABILITY_MODEL_ID};
