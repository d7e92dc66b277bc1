//! Source graph ingestion
//!
//! Walks the source graph, maps every entity into the target ontology and
//! collects the result into per-phase batches for upload.

mod identity;
mod input_graph;
mod processor;
mod redundancy;
mod traversal;
pub mod vocabulary;

pub use identity::{format_timestamp, get_twin_id, parse_timestamp, TwinMapping};
pub use input_graph::{FixtureInputGraph, InputGraph, InterfaceTypeTable};
pub use processor::{
    EntityTypes, GraphIngestionProcessor, IngestionError, IngestionResult, SyncPhase, SyncReport,
    SyncSession,
};
pub use redundancy::remove_redundant_relationships;
pub use traversal::Traversal;
