//! Output side of ingestion
//!
//! Traits for the digital twin store and the mapped-entry staging store, the
//! reconciliation that drives them, and in-memory implementations of both.

mod graph_manager;
mod mapping_client;
mod memory;
mod store;

pub use graph_manager::{DigitalTwinGraphManager, OutputGraphManager, UploadReport, UploadRequest};
pub use mapping_client::{MappedEntryRequest, MappingClient};
pub use memory::{InMemoryMappingClient, InMemoryTwinStore, MappingCall, StoreCall};
pub use store::{query_all_twins, StoreError, StoreResult, TwinPage, TwinQuery, TwinStore};
