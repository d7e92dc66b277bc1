//! Graph ingestion processor
//!
//! A sync runs as one of five independent phases. Each phase opens a
//! [`SyncSession`], walks the source graph into it, prunes redundant
//! relationships and hands the batch to the [`OutputGraphManager`]. Nothing
//! is written before that last step, and nothing carries over between phases.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::identity::{format_timestamp, parse_timestamp};
use super::input_graph::InputGraph;
use super::redundancy::remove_redundant_relationships;
use super::traversal::Traversal;
use super::vocabulary::{CONNECTOR_MODEL_ID, DEFAULT_MAPPED_CONNECTOR_ID};
use crate::config::{ConfigError, IngestionOptions};
use crate::ontology::{
    LoadedOntologyMapping, ModelError, OntologyError, OntologyMappingManager, RuleKind, RuleOutcome,
    TargetModelSet,
};
use crate::output::{OutputGraphManager, StoreError, UploadReport, UploadRequest};
use crate::value_objects::{
    value_text, Dtmi, Relationship, SyncErrors, Twin, TwinContents, TwinMetadata,
};

/// Errors that abort a whole phase
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Ontology mapping unavailable: {0}")]
    Ontology(#[from] OntologyError),

    #[error("Twin store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Target models could not be parsed: {0}")]
    ModelParse(#[from] ModelError),

    #[error("Invalid ingestion options: {0}")]
    Config(#[from] ConfigError),
}

pub type IngestionResult<T> = Result<T, IngestionError>;

/// The five sync phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    Organization,
    Connectors,
    Spatial,
    Things,
    Points,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Organization => "organization",
            Self::Connectors => "connectors",
            Self::Spatial => "spatial",
            Self::Things => "things",
            Self::Points => "points",
        };
        f.write_str(name)
    }
}

/// Which kinds of source entity a phase walks into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityTypes {
    pub accounts: bool,
    pub organization: bool,
    pub sites: bool,
    pub buildings: bool,
    pub connectors: bool,
    pub levels: bool,
    pub things: bool,
    pub points: bool,
}

impl EntityTypes {
    pub fn for_phase(phase: SyncPhase) -> Self {
        match phase {
            SyncPhase::Organization => Self {
                accounts: true,
                organization: true,
                sites: true,
                buildings: true,
                connectors: true,
                ..Self::default()
            },
            SyncPhase::Connectors => Self {
                buildings: true,
                connectors: true,
                ..Self::default()
            },
            SyncPhase::Spatial => Self {
                buildings: true,
                levels: true,
                ..Self::default()
            },
            SyncPhase::Things => Self {
                buildings: true,
                things: true,
                ..Self::default()
            },
            SyncPhase::Points => Self {
                buildings: true,
                things: true,
                points: true,
                ..Self::default()
            },
        }
    }
}

/// Result of one phase
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub phase: SyncPhase,
    /// Twins handed to the upload
    pub twins: usize,
    /// Relationships handed to the upload, after pruning
    pub relationships: usize,
    pub relationships_pruned: usize,
    pub upload: UploadReport,
    /// Errors of the traversal followed by those of the upload
    pub errors: SyncErrors,
}

/// In-memory batch of one phase
///
/// Twins and relationships are keyed by id; a later write for the same id
/// replaces the earlier one.
pub struct SyncSession {
    pub entity_types: EntityTypes,
    /// Site id given to twins without one
    pub site_id: String,
    /// Source connector whose identities name Willow twins
    pub willow_connector_id: String,
    pub errors: SyncErrors,
    pub twins: IndexMap<String, Twin>,
    pub relationships: IndexMap<String, Relationship>,
    ontology: Arc<LoadedOntologyMapping>,
    targets: Arc<TargetModelSet>,
    input_graph: Arc<dyn InputGraph>,
}

impl SyncSession {
    pub fn new(
        ontology: Arc<LoadedOntologyMapping>,
        targets: Arc<TargetModelSet>,
        input_graph: Arc<dyn InputGraph>,
        entity_types: EntityTypes,
    ) -> Self {
        Self {
            entity_types,
            site_id: String::new(),
            willow_connector_id: String::new(),
            errors: SyncErrors::new(),
            twins: IndexMap::new(),
            relationships: IndexMap::new(),
            ontology,
            targets,
            input_graph,
        }
    }

    pub fn targets(&self) -> &TargetModelSet {
        &self.targets
    }

    /// Input DTMI of a source type name; an unknown type is recorded as an error
    pub fn get_input_interface_dtmi(&mut self, interface_type: &str) -> Option<String> {
        if let Some(dtmi) = self.input_graph.try_get_dtmi(interface_type) {
            return Some(dtmi);
        }
        if interface_type == CONNECTOR_MODEL_ID {
            return Some(CONNECTOR_MODEL_ID.to_string());
        }
        warn!(interface_type, "Interface type not found in the input ontology");
        self.errors.record(
            interface_type,
            format!("Mapping for interface type '{interface_type}' not found in the input ontology"),
        );
        None
    }

    /// Output DTMI of a source type name; `None` when either lookup fails
    pub fn resolve_output_dtmi(&mut self, interface_type: &str) -> Option<String> {
        let input_dtmi = self.get_input_interface_dtmi(interface_type)?;
        self.ontology
            .try_get_output_interface_dtmi(&input_dtmi, &self.targets)
    }

    /// Build a twin from a source entity and put it in the batch
    ///
    /// Returns the output model id, or `None` when the entity has no
    /// representation in the target ontology.
    pub fn add_twin(
        &mut self,
        source: &Value,
        twin_id: &str,
        interface_type: &str,
        is_point: bool,
    ) -> Option<String> {
        let input_dtmi = self.get_input_interface_dtmi(interface_type)?;
        let Some(output_dtmi) = self
            .ontology
            .try_get_output_interface_dtmi(&input_dtmi, &self.targets)
        else {
            debug!(twin_id, %input_dtmi, interface_type, "No output interface, skipping twin");
            return None;
        };

        let output = match Dtmi::parse(&output_dtmi) {
            Ok(dtmi) => dtmi,
            Err(err) => {
                warn!(twin_id, %output_dtmi, error = %err, "Output DTMI cannot be parsed");
                self.errors.record(
                    twin_id,
                    format!("Output DTMI '{output_dtmi}' cannot be parsed: {err}"),
                );
                return None;
            }
        };

        let empty = Map::new();
        let fields = source.as_object().unwrap_or(&empty);
        let mut contents = TwinContents::new();

        if self.targets.contains(output.as_str()) {
            self.apply_declared_properties(fields, twin_id, output.as_str(), &mut contents);
            for component in self.targets.declared_components(output.as_str()) {
                let value = fields
                    .get(&component)
                    .filter(|value| !value.is_null())
                    .cloned()
                    .unwrap_or_else(|| json!({"$metadata": {}}));
                contents.insert(component, value);
            }
        } else {
            warn!(twin_id, model_id = %output, interface_type, "Target model not found");
            self.errors.record(
                twin_id,
                format!("Target model '{output}' for interface type '{interface_type}' not found"),
            );
        }

        contents
            .entry("name".to_string())
            .or_insert_with(|| Value::String("None".to_string()));
        contents
            .entry("siteID".to_string())
            .or_insert_with(|| Value::String(self.site_id.clone()));

        if let Some(identities) = fields.get("identities").and_then(Value::as_array) {
            contents.insert("mappedIds".to_string(), mapped_ids(identities));
        }

        if is_point {
            self.apply_point_defaults(fields, &output, &mut contents);
        }

        let twin = Twin {
            id: twin_id.to_string(),
            metadata: TwinMetadata {
                model_id: output.to_string(),
            },
            contents,
        };
        if self.twins.insert(twin_id.to_string(), twin).is_some() {
            debug!(twin_id, "Twin replaced within batch");
        }
        Some(output.into())
    }

    /// Base copy, then fill, projection and object transformation, each overwriting
    fn apply_declared_properties(
        &mut self,
        fields: &Map<String, Value>,
        twin_id: &str,
        output_dtmi: &str,
        contents: &mut TwinContents,
    ) {
        let ontology = Arc::clone(&self.ontology);
        let rules = ontology.rules();
        let ancestors = self.targets.ancestors(output_dtmi);

        for property in self.targets.declared_properties(output_dtmi) {
            if let Some(value) = fields.get(&property).filter(|value| !value.is_null()) {
                contents.insert(property.clone(), value.clone());
            }

            let direct = rules
                .rules_for_property(&property)
                .filter(|rule| rule.kind() != RuleKind::ObjectTransformation)
                .filter(|rule| rule.filter().is_match(output_dtmi));
            let transformations =
                rules.object_transformations_for(&property, fields, output_dtmi, &ancestors);

            for rule in direct.chain(transformations) {
                if let RuleOutcome::DuplicateCollectionKey(key) = rule.apply(fields, contents) {
                    warn!(twin_id, property = %property, key = %key, "Duplicate key in collection property");
                    self.errors.record(
                        twin_id,
                        format!("Duplicate key '{key}' in collection property '{property}'"),
                    );
                }
            }
        }
    }

    fn apply_point_defaults(
        &self,
        fields: &Map<String, Value>,
        output: &Dtmi,
        contents: &mut TwinContents,
    ) {
        if self.targets.is_capability(output) {
            let point_type = match fields.get("datatype").map(value_text) {
                Some(datatype) if datatype.eq_ignore_ascii_case("int") => "multiState",
                _ => "analog",
            };
            contents.insert("type".to_string(), json!(point_type));
            contents
                .entry("trendInterval".to_string())
                .or_insert_with(|| json!(900));
        }

        contents
            .entry("connectorID".to_string())
            .or_insert_with(|| json!(DEFAULT_MAPPED_CONNECTOR_ID));

        if let Some(connector) = fields
            .get("mappingKey")
            .and_then(Value::as_str)
            .and_then(mapped_connector_id)
        {
            contents.insert("mappedConnectorId".to_string(), json!(connector));
        }
    }

    /// Record a relationship in the batch, remapped and possibly reversed
    ///
    /// Returns the relationship id, or `None` when the target type has no
    /// representation in the target ontology.
    pub fn add_relationship(
        &mut self,
        source_id: &str,
        source_dtmi: Option<&str>,
        input_relationship: &str,
        target_id: &str,
        target_interface_type: &str,
        properties: IndexMap<String, Value>,
    ) -> Option<String> {
        let Some(target_dtmi) = self.resolve_output_dtmi(target_interface_type) else {
            debug!(source_id, target_id, target_interface_type, "Target not representable, skipping relationship");
            return None;
        };

        if input_relationship.trim().is_empty() {
            warn!(source_id, target_id, "Relationship has no name");
            self.errors.record(
                source_id,
                format!("Input relationship type is empty. Target: '{target_id}' ({target_dtmi})"),
            );
            return None;
        }

        let (name, reversed) = self.ontology.get_output_relationship_type(input_relationship);
        let (from, to) = if reversed {
            (target_id, source_id)
        } else {
            (source_id, target_id)
        };

        let mut relationship = Relationship::new(from, to, name);
        relationship.properties = properties;
        debug!(
            relationship_id = %relationship.id,
            source_dtmi = source_dtmi.unwrap_or_default(),
            %target_dtmi,
            reversed,
            "Adding relationship"
        );

        let id = relationship.id.clone();
        self.relationships.insert(id.clone(), relationship);
        Some(id)
    }
}

/// `mappedIds` entries for identities that carry a `__typename`
fn mapped_ids(identities: &[Value]) -> Value {
    let entries = identities
        .iter()
        .filter_map(|identity| {
            let exact_type = identity
                .get("__typename")
                .map(value_text)
                .filter(|t| !t.is_empty())?;

            let mut entry = Map::new();
            entry.insert("exactType".to_string(), Value::String(exact_type));
            for field in ["scope", "scopeId", "value"] {
                if let Some(value) = identity.get(field).filter(|v| !v.is_null()) {
                    entry.insert(field.to_string(), Value::String(value_text(value)));
                }
            }
            if let Some(created) = identity
                .get("dateCreated")
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
            {
                entry.insert("dateCreated".to_string(), Value::String(format_timestamp(&created)));
            }
            Some(Value::Object(entry))
        })
        .collect();
    Value::Array(entries)
}

/// Connector part of a `scheme://<connector>@host/...` mapping key
fn mapped_connector_id(mapping_key: &str) -> Option<&str> {
    mapping_key.split('/').nth(2)?.split('@').next()
}

/// Runs sync phases against the source and output graphs
pub struct GraphIngestionProcessor {
    ontology: Arc<OntologyMappingManager>,
    input_graph: Arc<dyn InputGraph>,
    output_graph: Arc<dyn OutputGraphManager>,
    options: IngestionOptions,
    dry_run: bool,
}

impl GraphIngestionProcessor {
    pub fn new(
        ontology: Arc<OntologyMappingManager>,
        input_graph: Arc<dyn InputGraph>,
        output_graph: Arc<dyn OutputGraphManager>,
        options: IngestionOptions,
    ) -> Self {
        Self {
            ontology,
            input_graph,
            output_graph,
            options,
            dry_run: false,
        }
    }

    /// Compute every upload decision without writing anything
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sites, buildings, building connectors, organization connectors and accounts
    pub async fn sync_organization(&self, auto_approve: bool) -> IngestionResult<SyncReport> {
        let phase = SyncPhase::Organization;
        let mut session = self.start_session(phase).await?;
        {
            let mut traversal = self.traversal(&mut session);
            traversal.sync_organization().await;
            traversal.sync_organization_connectors().await;
            traversal.sync_accounts().await;
        }
        Ok(self.finish(phase, session, UploadRequest::new("", ""), auto_approve).await)
    }

    pub async fn sync_connectors(&self, building_id: &str, auto_approve: bool) -> IngestionResult<SyncReport> {
        let phase = SyncPhase::Connectors;
        let mut session = self.start_building_session(phase, building_id).await?;
        self.traversal(&mut session)
            .sync_building_connectors(building_id)
            .await;
        let request = UploadRequest::new(building_id, "");
        Ok(self.finish(phase, session, request, auto_approve).await)
    }

    pub async fn sync_spatial(&self, building_id: &str, auto_approve: bool) -> IngestionResult<SyncReport> {
        let phase = SyncPhase::Spatial;
        let mut session = self.start_building_session(phase, building_id).await?;
        self.traversal(&mut session)
            .sync_building_spaces(building_id)
            .await;
        let request = UploadRequest::new(building_id, "");
        Ok(self.finish(phase, session, request, auto_approve).await)
    }

    pub async fn sync_things(
        &self,
        building_id: &str,
        connector_id: &str,
        auto_approve: bool,
    ) -> IngestionResult<SyncReport> {
        let phase = SyncPhase::Things;
        let mut session = self.start_building_session(phase, building_id).await?;
        self.traversal(&mut session)
            .sync_building_things(building_id, connector_id)
            .await;
        let request = UploadRequest::new(building_id, connector_id);
        Ok(self.finish(phase, session, request, auto_approve).await)
    }

    /// Things of a building together with their points
    pub async fn sync_points(
        &self,
        building_id: &str,
        connector_id: &str,
        auto_approve: bool,
    ) -> IngestionResult<SyncReport> {
        let phase = SyncPhase::Points;
        let mut session = self.start_building_session(phase, building_id).await?;
        self.traversal(&mut session)
            .sync_building_things(building_id, connector_id)
            .await;
        let request = UploadRequest::new(building_id, connector_id);
        Ok(self.finish(phase, session, request, auto_approve).await)
    }

    fn traversal<'a>(&'a self, session: &'a mut SyncSession) -> Traversal<'a> {
        Traversal::new(
            session,
            self.input_graph.as_ref(),
            self.output_graph.as_ref(),
            self.options.thing_query_batch_size,
        )
    }

    async fn start_session(&self, phase: SyncPhase) -> IngestionResult<SyncSession> {
        info!(%phase, "Starting sync");
        self.options.validate()?;

        let ontology = self.ontology.load().await?;
        let models = self.output_graph.get_models().await?;
        let targets = TargetModelSet::from_documents(&models)?;
        for missing in ontology.validate_target_mapping(&targets) {
            warn!(model_id = %missing, "Interface remap targets a model missing from the target ontology");
        }

        Ok(SyncSession::new(
            ontology,
            Arc::new(targets),
            Arc::clone(&self.input_graph),
            EntityTypes::for_phase(phase),
        ))
    }

    async fn start_building_session(
        &self,
        phase: SyncPhase,
        building_id: &str,
    ) -> IngestionResult<SyncSession> {
        let mut session = self.start_session(phase).await?;
        session.site_id = self
            .output_graph
            .get_site_id_for_mapped_building_id(building_id)
            .await?;
        debug!(building_id, site_id = %session.site_id, "Resolved site");
        Ok(session)
    }

    async fn finish(
        &self,
        phase: SyncPhase,
        mut session: SyncSession,
        request: UploadRequest,
        auto_approve: bool,
    ) -> SyncReport {
        let relationships_pruned = remove_redundant_relationships(
            &session.twins,
            &mut session.relationships,
            &session.targets,
        );
        let twins = session.twins.len();
        let relationships = session.relationships.len();
        info!(%phase, twins, relationships, relationships_pruned, "Uploading graph");

        let request = request
            .with_auto_approve(auto_approve)
            .with_dry_run(self.dry_run);
        let upload = self
            .output_graph
            .upload_graph(session.twins, session.relationships, &request)
            .await;

        let mut errors = session.errors;
        errors.merge(upload.errors.clone());
        info!(%phase, errors = errors.len(), "Completed sync");

        SyncReport {
            phase,
            twins,
            relationships,
            relationships_pruned,
            upload,
            errors,
        }
    }
}
