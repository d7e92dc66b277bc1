//! In-memory twin store and mapping store
//!
//! Both record every call they receive so tests can assert on the exact
//! traffic an upload produced, and both can be told to reject selected
//! requests.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashSet;

use super::mapping_client::{MappedEntryRequest, MappingClient};
use super::store::{StoreError, StoreResult, TwinPage, TwinQuery, TwinStore};
use crate::merge::{PatchDocument, Patchable};
use crate::value_objects::{MappedEntry, MappedEntryRecord, MappedEntryStatus, Relationship, Twin};

/// A request received by [`InMemoryTwinStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    GetTwinsByIds(Vec<String>),
    GetTwinById(String),
    QueryTwins { filter: String, continuation_token: Option<String> },
    UpdateTwin(String),
    PatchTwin { twin_id: String, operations: usize },
    DeleteTwinsAndRelationships(Vec<String>),
    GetRelationship(String),
    UpsertRelationship(String),
    GetModels,
}

impl StoreCall {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::UpdateTwin(_)
                | Self::PatchTwin { .. }
                | Self::DeleteTwinsAndRelationships(_)
                | Self::UpsertRelationship(_)
        )
    }
}

/// Twin store backed by ordered maps
pub struct InMemoryTwinStore {
    twins: RwLock<IndexMap<String, Twin>>,
    relationships: RwLock<IndexMap<String, Relationship>>,
    models: RwLock<Vec<Value>>,
    query_page_size: usize,
    rejected_ids: RwLock<HashSet<String>>,
    reads_unavailable: RwLock<bool>,
    calls: Mutex<Vec<StoreCall>>,
}

impl Default for InMemoryTwinStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTwinStore {
    pub fn new() -> Self {
        Self {
            twins: RwLock::new(IndexMap::new()),
            relationships: RwLock::new(IndexMap::new()),
            models: RwLock::new(Vec::new()),
            query_page_size: 100,
            rejected_ids: RwLock::new(HashSet::new()),
            reads_unavailable: RwLock::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Limit query pages so continuation tokens get exercised
    pub fn with_query_page_size(mut self, page_size: usize) -> Self {
        self.query_page_size = page_size.max(1);
        self
    }

    pub fn with_twins(self, twins: impl IntoIterator<Item = Twin>) -> Self {
        {
            let mut stored = self.twins.write();
            for twin in twins {
                stored.insert(twin.id.clone(), twin);
            }
        }
        self
    }

    pub fn with_relationships(self, relationships: impl IntoIterator<Item = Relationship>) -> Self {
        {
            let mut stored = self.relationships.write();
            for relationship in relationships {
                stored.insert(relationship.id.clone(), relationship);
            }
        }
        self
    }

    pub fn with_models(self, models: impl IntoIterator<Item = Value>) -> Self {
        self.models.write().extend(models);
        self
    }

    /// Reject every write touching the given twin or relationship id
    pub fn reject_writes_for(&self, id: impl Into<String>) {
        self.rejected_ids.write().insert(id.into());
    }

    /// Make batch twin reads fail with a transport error
    pub fn set_reads_unavailable(&self, unavailable: bool) {
        *self.reads_unavailable.write() = unavailable;
    }

    pub fn twin(&self, twin_id: &str) -> Option<Twin> {
        self.twins.read().get(twin_id).cloned()
    }

    pub fn twins(&self) -> Vec<Twin> {
        self.twins.read().values().cloned().collect()
    }

    pub fn relationship(&self, relationship_id: &str) -> Option<Relationship> {
        self.relationships.read().get(relationship_id).cloned()
    }

    pub fn relationships(&self) -> Vec<Relationship> {
        self.relationships.read().values().cloned().collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn writes(&self) -> Vec<StoreCall> {
        self.calls.lock().iter().filter(|c| c.is_write()).cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }

    fn check_rejected(&self, id: &str) -> StoreResult<()> {
        if self.rejected_ids.read().contains(id) {
            return Err(StoreError::Rejected {
                status: 400,
                message: format!("write to {id} rejected"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TwinStore for InMemoryTwinStore {
    async fn get_twins_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Twin>> {
        self.record(StoreCall::GetTwinsByIds(ids.to_vec()));
        if *self.reads_unavailable.read() {
            return Err(StoreError::Transport("twin store unavailable".to_string()));
        }
        let twins = self.twins.read();
        Ok(ids.iter().filter_map(|id| twins.get(id).cloned()).collect())
    }

    async fn get_twin_by_id(&self, twin_id: &str) -> StoreResult<Option<Twin>> {
        self.record(StoreCall::GetTwinById(twin_id.to_string()));
        Ok(self.twins.read().get(twin_id).cloned())
    }

    async fn query_twins(
        &self,
        query: &TwinQuery,
        continuation_token: Option<&str>,
    ) -> StoreResult<TwinPage> {
        self.record(StoreCall::QueryTwins {
            filter: query.filter(),
            continuation_token: continuation_token.map(str::to_string),
        });

        let offset = match continuation_token {
            Some(token) => token.parse::<usize>().map_err(|_| StoreError::Rejected {
                status: 400,
                message: format!("invalid continuation token {token}"),
            })?,
            None => 0,
        };

        let matching: Vec<Twin> = self
            .twins
            .read()
            .values()
            .filter(|twin| query.matches(twin))
            .cloned()
            .collect();

        let end = (offset + self.query_page_size).min(matching.len());
        let twins = matching.get(offset..end).map(<[Twin]>::to_vec).unwrap_or_default();
        let continuation_token = (end < matching.len()).then(|| end.to_string());

        Ok(TwinPage {
            twins,
            continuation_token,
        })
    }

    async fn update_twin(&self, twin: &Twin) -> StoreResult<()> {
        self.record(StoreCall::UpdateTwin(twin.id.clone()));
        self.check_rejected(&twin.id)?;
        self.twins.write().insert(twin.id.clone(), twin.clone());
        Ok(())
    }

    async fn patch_twin(&self, twin_id: &str, patch: &PatchDocument) -> StoreResult<()> {
        self.record(StoreCall::PatchTwin {
            twin_id: twin_id.to_string(),
            operations: patch.len(),
        });
        self.check_rejected(twin_id)?;

        let mut twins = self.twins.write();
        let twin = twins
            .get_mut(twin_id)
            .ok_or_else(|| StoreError::NotFound(twin_id.to_string()))?;
        twin.apply_patch(patch).map_err(|e| StoreError::Rejected {
            status: 400,
            message: e.to_string(),
        })
    }

    async fn delete_twins_and_relationships(&self, twin_ids: &[String]) -> StoreResult<()> {
        self.record(StoreCall::DeleteTwinsAndRelationships(twin_ids.to_vec()));
        for id in twin_ids {
            self.check_rejected(id)?;
        }

        let mut twins = self.twins.write();
        let mut relationships = self.relationships.write();
        for id in twin_ids {
            twins.shift_remove(id);
            relationships.retain(|_, relationship| !relationship.touches(id));
        }
        Ok(())
    }

    async fn get_relationship(
        &self,
        source_id: &str,
        relationship_id: &str,
    ) -> StoreResult<Option<Relationship>> {
        self.record(StoreCall::GetRelationship(relationship_id.to_string()));
        Ok(self
            .relationships
            .read()
            .get(relationship_id)
            .filter(|relationship| relationship.source_id == source_id)
            .cloned())
    }

    async fn upsert_relationship(&self, relationship: &Relationship) -> StoreResult<()> {
        self.record(StoreCall::UpsertRelationship(relationship.id.clone()));
        self.check_rejected(&relationship.id)?;
        self.relationships
            .write()
            .insert(relationship.id.clone(), relationship.clone());
        Ok(())
    }

    async fn get_models(&self) -> StoreResult<Vec<Value>> {
        self.record(StoreCall::GetModels);
        Ok(self.models.read().clone())
    }
}

/// A request received by [`InMemoryMappingClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingCall {
    GetMappedEntries(MappedEntryRequest),
    CreateMappedEntry { mapped_id: String, status: MappedEntryStatus },
    UpdateMappedEntry { mapped_id: String, status: MappedEntryStatus },
    CreateUpdateTwinRequest { twin_id: String, operations: usize },
}

/// Staging store backed by a vector of entries
///
/// Created records become entries, so a later upload sees what an earlier
/// one staged. Operators are simulated with [`approve`](Self::approve) and
/// [`ignore`](Self::ignore).
#[derive(Default)]
pub struct InMemoryMappingClient {
    entries: RwLock<Vec<MappedEntry>>,
    records: RwLock<IndexMap<String, MappedEntryRecord>>,
    update_requests: Mutex<Vec<(String, PatchDocument)>>,
    unavailable: RwLock<bool>,
    calls: Mutex<Vec<MappingCall>>,
}

impl InMemoryMappingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(self, entries: impl IntoIterator<Item = MappedEntry>) -> Self {
        self.entries.write().extend(entries);
        self
    }

    /// Make every call fail with a transport error
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }

    pub fn approve(&self, mapped_id: &str) -> bool {
        self.set_status(mapped_id, MappedEntryStatus::Approved)
    }

    pub fn ignore(&self, mapped_id: &str) -> bool {
        self.set_status(mapped_id, MappedEntryStatus::Ignore)
    }

    fn set_status(&self, mapped_id: &str, status: MappedEntryStatus) -> bool {
        match self.entries.write().iter_mut().find(|e| e.mapped_id == mapped_id) {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    pub fn entry(&self, mapped_id: &str) -> Option<MappedEntry> {
        self.entries
            .read()
            .iter()
            .find(|e| e.mapped_id == mapped_id)
            .cloned()
    }

    pub fn entries(&self) -> Vec<MappedEntry> {
        self.entries.read().clone()
    }

    /// Last record written for a mapped id
    pub fn record(&self, mapped_id: &str) -> Option<MappedEntryRecord> {
        self.records.read().get(mapped_id).cloned()
    }

    pub fn update_requests(&self) -> Vec<(String, PatchDocument)> {
        self.update_requests.lock().clone()
    }

    pub fn calls(&self) -> Vec<MappingCall> {
        self.calls.lock().clone()
    }

    /// Calls other than reads
    pub fn writes(&self) -> Vec<MappingCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| !matches!(c, MappingCall::GetMappedEntries(_)))
            .cloned()
            .collect()
    }

    fn check_available(&self) -> StoreResult<()> {
        if *self.unavailable.read() {
            return Err(StoreError::Transport("mapping store unavailable".to_string()));
        }
        Ok(())
    }

    fn store_record(&self, record: &MappedEntryRecord) {
        self.records
            .write()
            .insert(record.mapped_id.clone(), record.clone());

        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.mapped_id == record.mapped_id) {
            Some(entry) => entry.status = record.status,
            None => entries.push(MappedEntry {
                mapped_id: record.mapped_id.clone(),
                willow_id: Some(record.willow_id.clone()),
                willow_model_id: record.willow_model_id.clone(),
                name: record.name.clone(),
                status: record.status,
            }),
        }
    }
}

#[async_trait]
impl MappingClient for InMemoryMappingClient {
    async fn get_mapped_entries(&self, request: &MappedEntryRequest) -> StoreResult<Vec<MappedEntry>> {
        self.calls.lock().push(MappingCall::GetMappedEntries(*request));
        self.check_available()?;
        Ok(self
            .entries
            .read()
            .iter()
            .skip(request.offset)
            .take(request.page_size)
            .cloned()
            .collect())
    }

    async fn create_mapped_entry(&self, record: &MappedEntryRecord) -> StoreResult<()> {
        self.calls.lock().push(MappingCall::CreateMappedEntry {
            mapped_id: record.mapped_id.clone(),
            status: record.status,
        });
        self.check_available()?;
        self.store_record(record);
        Ok(())
    }

    async fn update_mapped_entry(&self, record: &MappedEntryRecord) -> StoreResult<()> {
        self.calls.lock().push(MappingCall::UpdateMappedEntry {
            mapped_id: record.mapped_id.clone(),
            status: record.status,
        });
        self.check_available()?;
        self.store_record(record);
        Ok(())
    }

    async fn create_update_twin_request(
        &self,
        twin_id: &str,
        operations: &PatchDocument,
    ) -> StoreResult<()> {
        self.calls.lock().push(MappingCall::CreateUpdateTwinRequest {
            twin_id: twin_id.to_string(),
            operations: operations.len(),
        });
        self.check_available()?;
        self.update_requests
            .lock()
            .push((twin_id.to_string(), operations.clone()));
        Ok(())
    }
}
