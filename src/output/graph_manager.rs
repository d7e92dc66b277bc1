//! Twin graph reconciliation
//!
//! [`DigitalTwinGraphManager`] takes the twins and relationships derived by
//! one sync phase and converges the twin store towards them. Twins the store
//! does not know yet are gated by the mapped-entry staging table; twins it
//! does know are diffed and patched. Every per-entity failure lands in the
//! [`UploadReport`] and the upload carries on with the rest.

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::mapping_client::{MappedEntryRequest, MappingClient};
use super::store::{query_all_twins, StoreError, StoreResult, TwinQuery, TwinStore};
use crate::config::{ConfigResult, IngestionOptions};
use crate::ingestion::vocabulary::{relationship_types, CONNECTOR_MODEL_ID};
use crate::merge::{try_create_patch_document, PatchDocument, PatchError, PatchOperation, Patchable};
use crate::value_objects::{
    MappedEntry, MappedEntryRecord, MappedEntryStatus, Relationship, SyncErrors, Twin,
};

/// Context of one upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub building_id: String,
    pub connector_id: String,
    /// Materialise twins without waiting for operator approval
    pub auto_approve: bool,
    /// Decide everything, write nothing
    pub dry_run: bool,
}

impl UploadRequest {
    pub fn new(building_id: impl Into<String>, connector_id: impl Into<String>) -> Self {
        Self {
            building_id: building_id.into(),
            connector_id: connector_id.into(),
            ..Default::default()
        }
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Outcome of one upload
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub twins_created: usize,
    pub twins_create_failed: usize,
    pub twins_updated: usize,
    pub twins_update_failed: usize,
    pub twins_unchanged: usize,
    pub mappings_added: usize,
    pub mappings_pending: usize,
    pub mappings_ignored: usize,
    pub manual_update_requests: usize,
    pub relationships_upserted: usize,
    pub relationships_failed: usize,
    pub relationships_unchanged: usize,
    pub relationships_skipped: usize,
    /// Twins left out of this upload; relationships touching them were skipped
    pub skipped_twin_ids: Vec<String>,
    pub errors: SyncErrors,
}

/// The write side of a sync
#[async_trait]
pub trait OutputGraphManager: Send + Sync {
    async fn upload_graph(
        &self,
        twins: IndexMap<String, Twin>,
        relationships: IndexMap<String, Relationship>,
        request: &UploadRequest,
    ) -> UploadReport;

    /// Site of a building twin; a building with no site is its own site
    async fn get_site_id_for_building(&self, building_id: &str) -> StoreResult<String>;

    /// Site of the building twin whose `externalID` is the mapped building id
    async fn get_site_id_for_mapped_building_id(&self, building_id: &str) -> StoreResult<String>;

    async fn get_twin_for_mapped_id(&self, mapped_id: &str) -> StoreResult<Option<Twin>>;

    async fn get_models(&self) -> StoreResult<Vec<Value>>;
}

#[derive(Debug, Error)]
enum WriteError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("Twin {twin_id} already exists under mapped id {mapped_id}")]
    Duplicate { twin_id: String, mapped_id: String },
}

/// Which end of the chosen relationship the parent sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParentSide {
    Source,
    Target,
}

/// Reconciles uploads against a [`TwinStore`] and a [`MappingClient`]
pub struct DigitalTwinGraphManager {
    store: Arc<dyn TwinStore>,
    mapping_client: Arc<dyn MappingClient>,
    options: IngestionOptions,
}

impl DigitalTwinGraphManager {
    /// Fails when the options do not validate
    pub fn new(
        store: Arc<dyn TwinStore>,
        mapping_client: Arc<dyn MappingClient>,
        options: IngestionOptions,
    ) -> ConfigResult<Self> {
        options.validate()?;
        Ok(Self {
            store,
            mapping_client,
            options,
        })
    }

    pub fn options(&self) -> &IngestionOptions {
        &self.options
    }

    async fn get_mapped_entries(&self) -> StoreResult<Vec<MappedEntry>> {
        let page_size = self.options.mapped_entry_page_size;
        let mut entries = Vec::new();

        for page in 0.. {
            let items = self
                .mapping_client
                .get_mapped_entries(&MappedEntryRequest::page(page_size, page))
                .await?;
            debug!(page, count = items.len(), "Read mapped entries page");
            if items.is_empty() {
                break;
            }
            entries.extend(items);
        }

        info!(count = entries.len(), "Read mapped entries");
        Ok(entries)
    }

    async fn import_twins(
        &self,
        twins: &mut IndexMap<String, Twin>,
        relationships: &IndexMap<String, Relationship>,
        request: &UploadRequest,
        skipped: &mut IndexSet<String>,
        report: &mut UploadReport,
    ) -> StoreResult<()> {
        info!(count = twins.len(), "Importing twins");
        let entries = self.get_mapped_entries().await?;
        let keys: Vec<String> = twins.keys().cloned().collect();

        for batch in keys.chunks(self.options.twin_batch_size) {
            let ids: Vec<String> = batch
                .iter()
                .filter_map(|key| twins.get(key))
                .map(|twin| twin.id.clone())
                .collect();

            let existing: HashMap<String, Twin> = self
                .store
                .get_twins_by_ids(&ids)
                .await?
                .into_iter()
                .map(|twin| (twin.id.clone(), twin))
                .collect();
            debug!(requested = ids.len(), found = existing.len(), "Fetched twin batch");

            for key in batch {
                let Some(mut twin) = twins.get(key).cloned() else {
                    continue;
                };
                let stored = existing.get(&twin.id);

                let mapping_id = mapping_id(&twin);
                let entry = entries.iter().find(|entry| entry.mapped_id == mapping_id);
                if let Some(entry) = entry {
                    apply_entry_overrides(&mut twin, entry);
                }

                match stored {
                    None => {
                        self.import_new_twin(&mut twin, entry, twins, relationships, request, skipped, report)
                            .await
                    }
                    Some(stored) => {
                        self.import_existing_twin(&twin, stored, entry, twins, relationships, request, report)
                            .await
                    }
                }

                twins.insert(key.clone(), twin);
            }
        }

        info!(
            created = report.twins_created,
            create_failed = report.twins_create_failed,
            updated = report.twins_updated,
            update_failed = report.twins_update_failed,
            unchanged = report.twins_unchanged,
            mappings_added = report.mappings_added,
            mappings_pending = report.mappings_pending,
            mappings_ignored = report.mappings_ignored,
            "Imported twins"
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn import_new_twin(
        &self,
        twin: &mut Twin,
        entry: Option<&MappedEntry>,
        twins: &IndexMap<String, Twin>,
        relationships: &IndexMap<String, Relationship>,
        request: &UploadRequest,
        skipped: &mut IndexSet<String>,
        report: &mut UploadReport,
    ) {
        let Some(entry) = entry else {
            debug!(twin_id = %twin.id, "Staging new twin for review");
            let record = mapped_entry_record(twins, relationships, twin, MappedEntryStatus::Pending, request);
            if self.write_mapped_entry(&record, true, request, &mut report.errors).await {
                report.mappings_added += 1;
            }
            skipped.insert(twin.id.clone());
            return;
        };

        if !request.auto_approve {
            match entry.status {
                MappedEntryStatus::Ignore => {
                    debug!(twin_id = %twin.id, "Mapped entry is ignored");
                    report.mappings_ignored += 1;
                    skipped.insert(twin.id.clone());
                    return;
                }
                MappedEntryStatus::Pending => {
                    let record =
                        mapped_entry_record(twins, relationships, twin, MappedEntryStatus::Pending, request);
                    if self.write_mapped_entry(&record, false, request, &mut report.errors).await {
                        report.mappings_pending += 1;
                    }
                    skipped.insert(twin.id.clone());
                    return;
                }
                MappedEntryStatus::Approved | MappedEntryStatus::Created => {}
            }
        }

        match self.materialize_twin(twin, entry, request).await {
            Ok(()) => {
                info!(twin_id = %twin.id, model_id = %twin.model_id(), "Created twin");
                report.twins_created += 1;
                if !request.auto_approve {
                    let record =
                        mapped_entry_record(twins, relationships, twin, MappedEntryStatus::Created, request);
                    self.write_mapped_entry(&record, false, request, &mut report.errors).await;
                }
            }
            Err(e) => {
                error!(twin_id = %twin.id, error = %e, "Failed to create twin");
                report
                    .errors
                    .record(twin.id.clone(), format!("Failed to create twin: {e}"));
                report.twins_create_failed += 1;
                skipped.insert(twin.id.clone());
            }
        }
    }

    async fn materialize_twin(
        &self,
        twin: &mut Twin,
        entry: &MappedEntry,
        request: &UploadRequest,
    ) -> Result<(), WriteError> {
        if entry.mapped_id != twin.id {
            if let Some(duplicate) = self.store.get_twin_by_id(&entry.mapped_id).await? {
                if !self.options.enable_twin_replace {
                    return Err(WriteError::Duplicate {
                        twin_id: duplicate.id,
                        mapped_id: entry.mapped_id.clone(),
                    });
                }
                info!(twin_id = %duplicate.id, "Deleting duplicate twin stored under mapped id");
                if !request.dry_run {
                    self.store
                        .delete_twins_and_relationships(std::slice::from_ref(&duplicate.id))
                        .await?;
                }
            }
        }

        if twin.model_id() == CONNECTOR_MODEL_ID {
            twin.contents
                .insert("uniqueID".to_string(), Value::String(Uuid::new_v4().to_string()));
        }

        if !request.dry_run {
            self.store.update_twin(twin).await?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn import_existing_twin(
        &self,
        twin: &Twin,
        stored: &Twin,
        entry: Option<&MappedEntry>,
        twins: &IndexMap<String, Twin>,
        relationships: &IndexMap<String, Relationship>,
        request: &UploadRequest,
        report: &mut UploadReport,
    ) {
        if !self.options.enable_updates {
            report.twins_unchanged += 1;
            return;
        }

        let (has_changes, patch) = try_create_patch_document(stored, twin);
        if !has_changes {
            report.twins_unchanged += 1;
            return;
        }

        let (auto, manual) = patch.partition_by_paths(&self.options.auto_patch_properties);
        match self.write_auto_patch(stored, auto, request).await {
            Ok(()) => {
                info!(twin_id = %twin.id, "Updated twin");
                report.twins_updated += 1;
            }
            Err(e) => {
                error!(twin_id = %twin.id, error = %e, "Failed to update twin");
                report
                    .errors
                    .record(twin.id.clone(), format!("Failed to update twin: {e}"));
                report.twins_update_failed += 1;
                return;
            }
        }

        // the twin can exist while its entry was never moved on from Approved
        if entry.is_some_and(|entry| entry.status == MappedEntryStatus::Approved) {
            let record = mapped_entry_record(twins, relationships, twin, MappedEntryStatus::Created, request);
            self.write_mapped_entry(&record, false, request, &mut report.errors).await;
        }

        if !manual.is_empty() {
            info!(twin_id = %twin.id, operations = manual.len(), "Raising manual update request");
            if request.dry_run {
                report.manual_update_requests += 1;
                return;
            }
            match self
                .mapping_client
                .create_update_twin_request(&twin.id, &manual)
                .await
            {
                Ok(()) => report.manual_update_requests += 1,
                Err(e) => {
                    error!(twin_id = %twin.id, error = %e, "Failed to raise update request");
                    report
                        .errors
                        .record(twin.id.clone(), format!("Failed to raise update request: {e}"));
                }
            }
        }
    }

    /// Apply the auto-patchable operations to the stored twin and write it back
    async fn write_auto_patch(
        &self,
        stored: &Twin,
        mut auto: PatchDocument,
        request: &UploadRequest,
    ) -> Result<(), WriteError> {
        if stored.model_id() == CONNECTOR_MODEL_ID && stored.content_string("uniqueID").is_none() {
            auto.push(PatchOperation::add(
                "/uniqueID",
                Value::String(Uuid::new_v4().to_string()),
            ));
        }

        let mut updated = stored.clone();
        updated.apply_patch(&auto)?;

        if request.dry_run {
            return Ok(());
        }
        if self.options.prefer_patch {
            if !auto.is_empty() {
                self.store.patch_twin(&stored.id, &auto).await?;
            }
        } else {
            self.store.update_twin(&updated).await?;
        }
        Ok(())
    }

    async fn write_mapped_entry(
        &self,
        record: &MappedEntryRecord,
        create: bool,
        request: &UploadRequest,
        errors: &mut SyncErrors,
    ) -> bool {
        info!(
            twin_id = %record.willow_id,
            mapped_id = %record.mapped_id,
            status = %record.status,
            create,
            "Writing mapped entry"
        );
        if request.dry_run {
            return true;
        }

        let result = if create {
            self.mapping_client.create_mapped_entry(record).await
        } else {
            self.mapping_client.update_mapped_entry(record).await
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(twin_id = %record.willow_id, error = %e, "Failed to write mapped entry");
                let action = if create { "create" } else { "update" };
                errors.record(
                    record.willow_id.clone(),
                    format!("Failed to {action} mapping entry for {}: {e}", record.mapped_id),
                );
                false
            }
        }
    }

    async fn import_relationships(
        &self,
        relationships: &IndexMap<String, Relationship>,
        request: &UploadRequest,
        skipped: &IndexSet<String>,
        report: &mut UploadReport,
    ) {
        info!(count = relationships.len(), "Importing relationships");

        for relationship in relationships.values() {
            if skipped.contains(&relationship.source_id) || skipped.contains(&relationship.target_id) {
                debug!(relationship_id = %relationship.id, "Skipping relationship to a skipped twin");
                report.relationships_skipped += 1;
                continue;
            }

            let existing = match self
                .store
                .get_relationship(&relationship.source_id, &relationship.id)
                .await
            {
                Ok(existing) => existing,
                Err(StoreError::NotFound(_)) => None,
                Err(e) => {
                    warn!(relationship_id = %relationship.id, error = %e, "Failed to read relationship");
                    report.errors.record(
                        relationship.id.clone(),
                        format!("Failed to read relationship: {e}"),
                    );
                    report.relationships_failed += 1;
                    continue;
                }
            };

            if existing.is_some_and(|existing| relationships_match(&existing, relationship)) {
                report.relationships_unchanged += 1;
                continue;
            }

            if request.dry_run {
                report.relationships_upserted += 1;
                continue;
            }

            match self.store.upsert_relationship(relationship).await {
                Ok(()) => report.relationships_upserted += 1,
                Err(e) => {
                    error!(
                        relationship_id = %relationship.id,
                        source_id = %relationship.source_id,
                        target_id = %relationship.target_id,
                        error = %e,
                        "Failed to upsert relationship"
                    );
                    report.errors.record(
                        relationship.id.clone(),
                        format!(
                            "Failed to upsert relationship from {} to {}: {e}",
                            relationship.source_id, relationship.target_id
                        ),
                    );
                    report.relationships_failed += 1;
                }
            }
        }

        info!(
            upserted = report.relationships_upserted,
            failed = report.relationships_failed,
            unchanged = report.relationships_unchanged,
            skipped = report.relationships_skipped,
            "Imported relationships"
        );
    }
}

#[async_trait]
impl OutputGraphManager for DigitalTwinGraphManager {
    async fn upload_graph(
        &self,
        mut twins: IndexMap<String, Twin>,
        relationships: IndexMap<String, Relationship>,
        request: &UploadRequest,
    ) -> UploadReport {
        let mut report = UploadReport::default();
        let mut skipped = IndexSet::new();

        if let Err(e) = self
            .import_twins(&mut twins, &relationships, request, &mut skipped, &mut report)
            .await
        {
            error!(error = %e, "Unable to import twins");
            report
                .errors
                .record("Twins", format!("Failed to insert or update twins: {e}"));
        }

        self.import_relationships(&relationships, request, &skipped, &mut report)
            .await;

        report.skipped_twin_ids = skipped.into_iter().collect();
        report
    }

    async fn get_site_id_for_building(&self, building_id: &str) -> StoreResult<String> {
        let twins = self.store.get_twins_by_ids(&[building_id.to_string()]).await?;
        Ok(twins
            .first()
            .and_then(site_id_of)
            .unwrap_or_else(|| building_id.to_string()))
    }

    async fn get_site_id_for_mapped_building_id(&self, building_id: &str) -> StoreResult<String> {
        let twins = query_all_twins(self.store.as_ref(), &TwinQuery::ExternalId(building_id.to_string())).await?;
        Ok(twins
            .first()
            .and_then(site_id_of)
            .unwrap_or_else(|| building_id.to_string()))
    }

    async fn get_twin_for_mapped_id(&self, mapped_id: &str) -> StoreResult<Option<Twin>> {
        let twins = query_all_twins(self.store.as_ref(), &TwinQuery::ExternalId(mapped_id.to_string())).await?;
        match twins.into_iter().next() {
            Some(twin) => {
                info!(mapped_id, twin_id = %twin.id, "Found twin for mapped id");
                Ok(Some(twin))
            }
            None => {
                info!(mapped_id, "No twin for mapped id");
                Ok(None)
            }
        }
    }

    async fn get_models(&self) -> StoreResult<Vec<Value>> {
        self.store.get_models().await
    }
}

fn site_id_of(twin: &Twin) -> Option<String> {
    twin.content_string("siteID").filter(|site| !site.is_empty())
}

/// The id a twin is staged under: its `externalID`, else its twin id
fn mapping_id(twin: &Twin) -> String {
    twin.content_string("externalID")
        .unwrap_or_else(|| twin.id.clone())
}

fn apply_entry_overrides(twin: &mut Twin, entry: &MappedEntry) {
    if !entry.willow_model_id.is_empty() {
        twin.metadata.model_id = entry.willow_model_id.clone();
    }
    twin.contents
        .insert("name".to_string(), Value::String(entry.name.clone()));
    if let Some(willow_id) = entry.willow_id_override() {
        twin.id = willow_id.to_string();
    }
}

/// The relationship that best describes where a twin sits
///
/// A relationship pointing at the twin wins; otherwise the twin's own
/// `isCapabilityOf`, then `isPartOf`, then whatever it has.
fn parent_relationship<'a>(
    relationships: &'a IndexMap<String, Relationship>,
    twin_id: &str,
) -> Option<(&'a Relationship, ParentSide)> {
    if let Some(incoming) = relationships.values().find(|r| r.target_id == twin_id) {
        return Some((incoming, ParentSide::Source));
    }

    let outgoing: Vec<&Relationship> = relationships
        .values()
        .filter(|r| r.source_id == twin_id)
        .collect();

    [relationship_types::IS_CAPABILITY_OF, relationship_types::IS_PART_OF]
        .iter()
        .find_map(|name| outgoing.iter().find(|r| r.name == *name).copied())
        .or_else(|| outgoing.first().copied())
        .map(|r| (r, ParentSide::Target))
}

fn mapped_entry_record(
    twins: &IndexMap<String, Twin>,
    relationships: &IndexMap<String, Relationship>,
    twin: &Twin,
    status: MappedEntryStatus,
    request: &UploadRequest,
) -> MappedEntryRecord {
    let parent = parent_relationship(relationships, &twin.id);

    let mut parent_mapped_id = String::new();
    let mut parent_willow_id = String::new();
    if let Some((relationship, side)) = parent {
        let parent_id = match side {
            ParentSide::Source => &relationship.source_id,
            ParentSide::Target => &relationship.target_id,
        };
        match twins.get(parent_id) {
            Some(parent_twin) => {
                if let Some(external_id) = parent_twin.content_string("externalID") {
                    parent_mapped_id = external_id;
                    parent_willow_id = parent_twin.id.clone();
                }
            }
            None => debug!(twin_id = %twin.id, parent_id = %parent_id, "Parent twin not in upload"),
        }
    }

    let mapped_model_id = twin
        .contents
        .get("alternateClassification")
        .and_then(|classification| classification.pointer("/brickSchema/code"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let unit = match twin.contents.get("unit") {
        Some(Value::Object(unit)) => unit
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Some(Value::String(unit)) => unit.clone(),
        _ => String::new(),
    };

    MappedEntryRecord {
        description: twin
            .content_string("description")
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_default(),
        mapped_model_id,
        name: twin.content_string("name").unwrap_or_default(),
        willow_model_id: twin.model_id().to_string(),
        status,
        mapped_id: mapping_id(twin),
        parent_mapped_id,
        parent_willow_id,
        willow_parent_rel: parent.map(|(relationship, _)| relationship.name.clone()),
        connector_id: request.connector_id.clone(),
        willow_id: twin.id.clone(),
        building_id: request.building_id.clone(),
        unit,
        data_type: twin.content_string("type").unwrap_or_default(),
    }
}

/// Same endpoints and name, and no property the new relationship would change
fn relationships_match(existing: &Relationship, new: &Relationship) -> bool {
    existing.name == new.name
        && existing.source_id == new.source_id
        && existing.target_id == new.target_id
        && !try_create_patch_document(existing, new).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rel(source: &str, target: &str, name: &str) -> (String, Relationship) {
        let relationship = Relationship::new(source, target, name);
        (relationship.id.clone(), relationship)
    }

    #[test]
    fn test_parent_prefers_incoming_relationship() {
        let relationships: IndexMap<_, _> = [
            rel("p1", "thing", "isPartOf"),
            rel("floor", "p1", "hasPart"),
        ]
        .into_iter()
        .collect();

        let (relationship, side) = parent_relationship(&relationships, "p1").unwrap();
        assert_eq!(relationship.source_id, "floor");
        assert_eq!(side, ParentSide::Source);
    }

    #[test]
    fn test_parent_outgoing_preference_order() {
        let relationships: IndexMap<_, _> = [
            rel("p1", "zone", "isLocatedIn"),
            rel("p1", "room", "isPartOf"),
            rel("p1", "ahu", "isCapabilityOf"),
        ]
        .into_iter()
        .collect();
        let (relationship, side) = parent_relationship(&relationships, "p1").unwrap();
        assert_eq!(relationship.name, "isCapabilityOf");
        assert_eq!(side, ParentSide::Target);

        let relationships: IndexMap<_, _> = [rel("p1", "zone", "isLocatedIn"), rel("p1", "room", "isPartOf")]
            .into_iter()
            .collect();
        assert_eq!(parent_relationship(&relationships, "p1").unwrap().0.name, "isPartOf");

        let relationships: IndexMap<_, _> = [rel("p1", "zone", "isLocatedIn")].into_iter().collect();
        assert_eq!(parent_relationship(&relationships, "p1").unwrap().0.name, "isLocatedIn");

        assert!(parent_relationship(&IndexMap::new(), "p1").is_none());
    }

    #[test]
    fn test_mapped_entry_record_fields() {
        let parent = Twin::new("ahu-1", "dtmi:com:willowinc:AirHandlingUnit;1")
            .with_content("externalID", json!("THG1"));
        let point = Twin::new("PNT1", "dtmi:com:willowinc:TemperatureSensor;1")
            .with_content("name", json!("Zone Temp"))
            .with_content("description", json!("  "))
            .with_content("alternateClassification", json!({"brickSchema": {"code": "Zone_Air_Temperature_Sensor"}}))
            .with_content("unit", json!({"id": "degC"}))
            .with_content("type", json!("analog"));

        let twins: IndexMap<_, _> = [("ahu-1".to_string(), parent), ("PNT1".to_string(), point.clone())]
            .into_iter()
            .collect();
        let relationships: IndexMap<_, _> = [rel("ahu-1", "PNT1", "hasPoint")].into_iter().collect();

        let record = mapped_entry_record(
            &twins,
            &relationships,
            &point,
            MappedEntryStatus::Pending,
            &UploadRequest::new("BLDG1", "CON1"),
        );

        assert_eq!(record.description, "");
        assert_eq!(record.mapped_model_id, "Zone_Air_Temperature_Sensor");
        assert_eq!(record.name, "Zone Temp");
        assert_eq!(record.mapped_id, "PNT1");
        assert_eq!(record.parent_mapped_id, "THG1");
        assert_eq!(record.parent_willow_id, "ahu-1");
        assert_eq!(record.willow_parent_rel.as_deref(), Some("hasPoint"));
        assert_eq!(record.unit, "degC");
        assert_eq!(record.data_type, "analog");
        assert_eq!(record.building_id, "BLDG1");
        assert_eq!(record.connector_id, "CON1");
    }

    #[test]
    fn test_entry_overrides() {
        let mut twin = Twin::new("PNT1", "dtmi:a;1").with_content("name", json!("old"));
        let entry = MappedEntry {
            mapped_id: "PNT1".into(),
            willow_id: Some("-".into()),
            willow_model_id: "dtmi:b;1".into(),
            name: "new".into(),
            status: MappedEntryStatus::Approved,
        };
        apply_entry_overrides(&mut twin, &entry);
        assert_eq!(twin.id, "PNT1");
        assert_eq!(twin.model_id(), "dtmi:b;1");
        assert_eq!(twin.contents["name"], "new");

        let entry = MappedEntry {
            willow_id: Some("willow-1".into()),
            ..entry
        };
        apply_entry_overrides(&mut twin, &entry);
        assert_eq!(twin.id, "willow-1");
    }

    #[test]
    fn test_relationship_match_ignores_removed_properties() {
        let existing = Relationship::new("a", "b", "serves").with_property("extra", json!("x"));
        let same = Relationship::new("a", "b", "serves");
        assert!(relationships_match(&existing, &same));

        let changed = Relationship::new("a", "b", "serves").with_property("extra", json!("y"));
        assert!(!relationships_match(&existing, &changed));
    }
}
