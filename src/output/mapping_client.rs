//! Mapped-entry staging store
//!
//! Twins discovered in the source system are staged here for operator review
//! before they are created in the twin store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::store::StoreResult;
use crate::merge::PatchDocument;
use crate::value_objects::{MappedEntry, MappedEntryRecord};

/// Paging window for reading mapped entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedEntryRequest {
    pub page_size: usize,
    pub offset: usize,
}

impl MappedEntryRequest {
    /// Request for the zero-based page `page`
    pub fn page(page_size: usize, page: usize) -> Self {
        Self {
            page_size,
            offset: page_size * page,
        }
    }
}

#[async_trait]
pub trait MappingClient: Send + Sync {
    /// One page of entries; an empty page ends the listing
    async fn get_mapped_entries(&self, request: &MappedEntryRequest) -> StoreResult<Vec<MappedEntry>>;

    async fn create_mapped_entry(&self, record: &MappedEntryRecord) -> StoreResult<()>;

    async fn update_mapped_entry(&self, record: &MappedEntryRecord) -> StoreResult<()>;

    /// Raise changes to an existing twin that need operator approval
    async fn create_update_twin_request(
        &self,
        twin_id: &str,
        operations: &PatchDocument,
    ) -> StoreResult<()>;
}
