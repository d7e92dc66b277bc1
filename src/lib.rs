//! Topology ingestion for digital twin graphs
//!
//! Pulls building topology from a source graph, maps it into the target
//! ontology through declarative rules, and converges the twin store towards
//! the result with minimal writes. Twins that the store does not know yet are
//! gated by operator-reviewed mapped entries.

pub mod config;
pub mod ingestion;
pub mod merge;
pub mod ontology;
pub mod output;
pub mod telemetry;
pub mod value_objects;

// Re-export configuration
pub use config::{ConfigError, ConfigResult, IngestionOptions};

// Re-export the pipeline
pub use ingestion::{
    FixtureInputGraph, GraphIngestionProcessor, IngestionError, IngestionResult, InputGraph,
    InterfaceTypeTable, SyncPhase, SyncReport, SyncSession,
};

// Re-export the merge engine
pub use merge::{try_create_patch_document, PatchDocument, PatchOperation, Patchable};

// Re-export ontology types
pub use ontology::{
    LoadedOntologyMapping, OntologyError, OntologyMapping, OntologyMappingLoader,
    OntologyMappingManager, StaticOntologyMappingLoader, TargetModelSet,
};

// Re-export output collaborators
pub use output::{
    DigitalTwinGraphManager, InMemoryMappingClient, InMemoryTwinStore, MappingClient,
    OutputGraphManager, StoreError, TwinStore, UploadReport, UploadRequest,
};

// Re-export value objects
pub use value_objects::{
    Dtmi, MappedEntry, MappedEntryStatus, Relationship, SyncErrors, Twin, TwinContents,
};

pub use telemetry::{init_tracing, LogFormat};
