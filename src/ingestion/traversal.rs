//! Source graph traversal
//!
//! Walks query results into a [`SyncSession`]: sites and their place trees,
//! buildings, floors, things, points, connectors and accounts. Problems with
//! single entities are recorded in the session and the walk carries on.

use indexmap::IndexMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, warn};

use super::identity::{get_twin_id, TwinMapping};
use super::input_graph::{collection_items, InputGraph};
use super::processor::SyncSession;
use super::vocabulary::{
    relationship_types, CONNECTOR_MODEL_ID, GRID_REGION_MODEL_ID, IDENTITY_TWIN_PREFIX,
    WILLOW_CONNECTOR_TYPE_ID,
};
use crate::output::OutputGraphManager;
use crate::value_objects::{value_text, Twin};

const PROCESSING_ERROR: &str = "Processing Error";

/// A place that links to the place being walked
struct PlaceParent {
    twin_id: String,
    dtmi: Option<String>,
    relationship: String,
}

/// One walk over the source graph, writing into a session
pub struct Traversal<'a> {
    session: &'a mut SyncSession,
    input_graph: &'a dyn InputGraph,
    output_graph: &'a dyn OutputGraphManager,
    thing_query_batch_size: usize,
}

impl<'a> Traversal<'a> {
    pub fn new(
        session: &'a mut SyncSession,
        input_graph: &'a dyn InputGraph,
        output_graph: &'a dyn OutputGraphManager,
        thing_query_batch_size: usize,
    ) -> Self {
        Self {
            session,
            input_graph,
            output_graph,
            thing_query_batch_size: thing_query_batch_size.max(1),
        }
    }

    fn twin_mapping(&self, element: &Value) -> Option<TwinMapping> {
        get_twin_id(element, &self.session.willow_connector_id)
    }

    /// Id of the source connector whose identities carry Willow twin ids
    async fn get_willow_connector(&self) -> String {
        let query = self.input_graph.get_connectors_query();
        let Some(document) = self.input_graph.get_twin_graph(&query).await else {
            return String::new();
        };

        let connector_id = collection_items(&document)
            .map(|(_, connector)| connector)
            .find(|connector| {
                connector.get("connectorTypeId").map(value_text).as_deref()
                    == Some(WILLOW_CONNECTOR_TYPE_ID)
            })
            .and_then(|connector| connector.get("id"))
            .map(value_text)
            .unwrap_or_default();
        connector_id
    }

    pub async fn sync_organization(&mut self) {
        if !self.session.entity_types.organization {
            return;
        }

        let query = self.input_graph.get_organization_query();
        let Some(document) = self.input_graph.get_twin_graph(&query).await else {
            info!("No sites found for the organization");
            self.session
                .errors
                .record(PROCESSING_ERROR, "No sites found for this organization");
            return;
        };

        let sites: Vec<&Value> = collection_items(&document).map(|(_, site)| site).collect();
        for site in sites {
            self.sync_site(site).await;
        }
    }

    async fn sync_site(&mut self, site: &Value) {
        if !self.session.entity_types.sites {
            return;
        }
        info!("Syncing site");

        self.session.willow_connector_id = self.get_willow_connector().await;
        self.get_places(site, None).await;

        let Some(site_id) = site.get("id").filter(|id| !id.is_null()).map(value_text) else {
            warn!("Site has no id");
            self.session
                .errors
                .record(PROCESSING_ERROR, "No site id found for this site");
            return;
        };

        if !self.session.entity_types.buildings {
            return;
        }

        let query = self.input_graph.get_buildings_for_site_query(&site_id);
        let Some(document) = self.input_graph.get_twin_graph(&query).await else {
            info!(site_id, "No buildings found for site");
            return;
        };

        let site_elements: Vec<&Value> = collection_items(&document).map(|(_, s)| s).collect();
        for site_element in site_elements {
            let parent = self.place_parent(site_element, relationship_types::HAS_PART);
            let buildings = site_element
                .get("buildings")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for building in buildings.iter().filter(|b| !b.is_null()) {
                let Some(mapping) = self.twin_mapping(building) else {
                    continue;
                };

                self.session.site_id =
                    match self.output_graph.get_site_id_for_building(mapping.twin_id()).await {
                        Ok(site_id) => site_id,
                        Err(err) => {
                            warn!(building_id = mapping.twin_id(), error = %err, "Site lookup failed");
                            self.session.errors.record(
                                mapping.twin_id(),
                                format!("Site lookup failed for building: {err}"),
                            );
                            mapping.twin_id().to_string()
                        }
                    };

                self.get_places(building, parent.as_ref()).await;

                if self.session.entity_types.connectors {
                    self.sync_building_connectors(&mapping.mapped_id).await;
                }
                if self.session.entity_types.things {
                    self.sync_building_things(&mapping.mapped_id, "").await;
                }
            }
        }
        info!(site_id, "Completed site");
    }

    /// Connectors of the whole organization
    pub async fn sync_organization_connectors(&mut self) {
        let query = self.input_graph.get_connectors_query();
        let Some(document) = self.input_graph.get_twin_graph(&query).await else {
            return;
        };
        for (_, connector) in collection_items(&document) {
            self.add_connector(connector, None);
        }
    }

    pub async fn sync_accounts(&mut self) {
        if !self.session.entity_types.accounts {
            return;
        }

        let query = self.input_graph.get_accounts_query();
        let Some(document) = self.input_graph.get_twin_graph(&query).await else {
            info!("No accounts found for the organization");
            self.session
                .errors
                .record(PROCESSING_ERROR, "No accounts found for this organization");
            return;
        };

        for (_, account) in collection_items(&document) {
            let Some(mapping) = self.twin_mapping(account) else {
                continue;
            };
            let Some(exact_type) = account.get("exactType").map(value_text) else {
                continue;
            };
            let account_dtmi = self
                .session
                .add_twin(account, mapping.twin_id(), &exact_type, false);

            for (field, relationship) in [
                ("hasProvider", relationship_types::IS_PROVIDED_BY),
                ("hasBill", relationship_types::HAS_UTILITY_BILL),
            ] {
                let items = account
                    .get(field)
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for item in items.iter().filter(|item| item.is_object()) {
                    let Some(item_mapping) = self.twin_mapping(item) else {
                        continue;
                    };
                    let Some(item_type) = item.get("exactType").map(value_text) else {
                        continue;
                    };
                    self.session
                        .add_twin(item, item_mapping.twin_id(), &item_type, false);
                    self.session.add_relationship(
                        mapping.twin_id(),
                        account_dtmi.as_deref(),
                        relationship,
                        item_mapping.twin_id(),
                        &item_type,
                        IndexMap::new(),
                    );
                }
            }
            debug!(account_id = mapping.twin_id(), "Processed account");
        }
    }

    /// Put the stored building twin into the batch; `None` if it does not exist
    async fn add_stored_building(&mut self, building_id: &str) -> Option<Twin> {
        let building = match self.output_graph.get_twin_for_mapped_id(building_id).await {
            Ok(Some(building)) => building,
            Ok(None) => {
                warn!(building_id, "Building not found for mapped building id");
                self.session.errors.record(
                    building_id,
                    "Willow building not found for mapped building id",
                );
                return None;
            }
            Err(err) => {
                warn!(building_id, error = %err, "Building lookup failed");
                self.session
                    .errors
                    .record(building_id, format!("Building lookup failed: {err}"));
                return None;
            }
        };

        if self.session.twins.contains_key(&building.id) {
            debug!(building_id, twin_id = %building.id, "Building already in batch");
        } else {
            info!(building_id, twin_id = %building.id, "Added building to batch");
            self.session
                .twins
                .insert(building.id.clone(), building.clone());
        }
        Some(building)
    }

    pub async fn sync_building_connectors(&mut self, building_id: &str) {
        let Some(building) = self.add_stored_building(building_id).await else {
            return;
        };

        let query = self.input_graph.get_building_connectors_query(building_id);
        let Some(document) = self.input_graph.get_twin_graph(&query).await else {
            return;
        };

        for (_, building_element) in collection_items(&document) {
            let groups = building_element.as_object().into_iter().flat_map(|o| o.values());
            for connector in groups.filter_map(Value::as_array).flatten() {
                self.add_connector(connector, Some(&building));
            }
        }
    }

    pub async fn sync_building_spaces(&mut self, building_id: &str) {
        if self.add_stored_building(building_id).await.is_none() {
            return;
        }
        self.session.willow_connector_id = self.get_willow_connector().await;

        let query = self.input_graph.get_building_query(building_id);
        let Some(document) = self.input_graph.get_twin_graph(&query).await else {
            return;
        };

        let buildings: Vec<&Value> = collection_items(&document)
            .filter(|(collection, _)| *collection == "buildings")
            .map(|(_, building)| building)
            .collect();
        for building in buildings {
            self.get_places(building, None).await;
        }
    }

    pub async fn sync_building_things(&mut self, building_id: &str, connector_id: &str) {
        if self.add_stored_building(building_id).await.is_none() {
            return;
        }
        self.session.willow_connector_id = self.get_willow_connector().await;

        let query = self.input_graph.get_building_things_query(building_id, connector_id);
        let Some(document) = self.input_graph.get_twin_graph(&query).await else {
            return;
        };

        let building_elements: Vec<&Value> =
            collection_items(&document).map(|(_, b)| b).collect();
        for building in building_elements {
            let mut things: IndexMap<String, TwinMapping> = IndexMap::new();
            let thing_elements = building
                .get("things")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for thing in thing_elements {
                if let Some(mapping) = self.get_thing(thing).await {
                    things
                        .entry(mapping.twin_id().to_string())
                        .or_insert(mapping);
                }
            }

            if !things.is_empty() {
                info!(building_id, things = things.len(), "Fetching points");
                self.get_points(things).await;
            }
        }
    }

    async fn get_thing(&mut self, thing: &Value) -> Option<TwinMapping> {
        let mapping = self.twin_mapping(thing)?;
        let exact_type = thing.get("exactType").map(value_text)?;
        let thing_id = mapping.twin_id().to_string();
        let thing_dtmi = self.session.add_twin(thing, &thing_id, &exact_type, false);

        if let Some(location) = thing
            .get(relationship_types::HAS_LOCATION)
            .filter(|l| !l.is_null())
        {
            let location_type = location.get("exactType").map(value_text);
            if let (Some(location_mapping), Some(location_type)) =
                (self.twin_mapping(location), location_type)
            {
                let location_dtmi = self.session.resolve_output_dtmi(&location_type);
                self.session.add_relationship(
                    location_mapping.twin_id(),
                    location_dtmi.as_deref(),
                    relationship_types::IS_LOCATION_OF,
                    &thing_id,
                    &exact_type,
                    IndexMap::new(),
                );
            }
        }

        let thing_dtmi = thing_dtmi?;
        for relationship in [relationship_types::IS_FED_BY, relationship_types::SERVES] {
            self.add_thing_relationships(thing, &thing_id, &thing_dtmi, relationship)
                .await;
        }
        Some(mapping)
    }

    async fn add_thing_relationships(
        &mut self,
        thing: &Value,
        thing_id: &str,
        thing_dtmi: &str,
        relationship: &str,
    ) {
        let related = thing
            .get(relationship)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let parent = PlaceParent {
            twin_id: thing_id.to_string(),
            dtmi: Some(thing_dtmi.to_string()),
            relationship: relationship.to_string(),
        };

        for element in related {
            if relationship == relationship_types::SERVES {
                self.get_places(element, Some(&parent)).await;
            }

            let Some(mapping) = self.twin_mapping(element) else {
                continue;
            };
            let Some(exact_type) = element.get("exactType").map(value_text) else {
                continue;
            };

            let properties: IndexMap<String, Value> = element
                .get("properties")
                .and_then(Value::as_object)
                .map(|properties| {
                    properties
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(value_text(v))))
                        .collect()
                })
                .unwrap_or_default();

            self.session.add_relationship(
                thing_id,
                Some(thing_dtmi),
                relationship,
                mapping.twin_id(),
                &exact_type,
                properties,
            );
        }
    }

    /// Parent link from an already walked element
    fn place_parent(&mut self, element: &Value, relationship: &str) -> Option<PlaceParent> {
        let mapping = self.twin_mapping(element)?;
        let dtmi = element
            .get("exactType")
            .map(value_text)
            .and_then(|exact_type| self.session.resolve_output_dtmi(&exact_type));
        Some(PlaceParent {
            twin_id: mapping.twin_id().to_string(),
            dtmi,
            relationship: relationship.to_string(),
        })
    }

    /// Add a place and everything below it
    ///
    /// Arrays of points become `hasPoint` relationships; every other array
    /// or object field is walked as a child place linked by the field name.
    fn get_places<'b>(
        &'b mut self,
        target: &'b Value,
        parent: Option<&'b PlaceParent>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'b>> {
        Box::pin(async move {
            let Some(mapping) = self.twin_mapping(target) else {
                return;
            };
            let target_id = mapping.twin_id().to_string();

            let Some(exact_type) = target.get("exactType").map(value_text) else {
                if !target_id.starts_with(IDENTITY_TWIN_PREFIX) {
                    warn!(twin_id = %target_id, "Place has no exactType");
                    self.session
                        .errors
                        .record(target_id.as_str(), "ExactType not found for twin");
                }
                return;
            };

            let target_dtmi = self.session.add_twin(target, &target_id, &exact_type, false);
            let fields = target.as_object().into_iter().flatten();

            for (name, value) in fields {
                match value {
                    Value::Array(items) if is_point_collection(name) => {
                        for point in items.iter().filter(|item| item.is_object()) {
                            self.add_place_point(point, &target_id, target_dtmi.as_deref());
                        }
                    }
                    Value::Array(items) => {
                        let child_parent = PlaceParent {
                            twin_id: target_id.clone(),
                            dtmi: target_dtmi.clone(),
                            relationship: name.clone(),
                        };
                        for item in items.iter().filter(|item| item.is_object()) {
                            self.get_places(item, Some(&child_parent)).await;
                        }
                    }
                    Value::Object(_) => {
                        let child_parent = PlaceParent {
                            twin_id: target_id.clone(),
                            dtmi: target_dtmi.clone(),
                            relationship: name.clone(),
                        };
                        self.get_places(value, Some(&child_parent)).await;
                    }
                    _ => {}
                }
            }

            if let Some(parent) = parent.filter(|p| !p.relationship.trim().is_empty()) {
                let relationship = match parent.relationship.as_str() {
                    "zones" => relationship_types::HAS_PART,
                    relationship_types::IS_PART_OF
                        if target_dtmi.as_deref() == Some(GRID_REGION_MODEL_ID) =>
                    {
                        relationship_types::LOCATED_IN_GRID_REGION
                    }
                    other => other,
                };
                self.session.add_relationship(
                    &parent.twin_id,
                    parent.dtmi.as_deref(),
                    relationship,
                    &target_id,
                    &exact_type,
                    IndexMap::new(),
                );
            }

            if self.session.entity_types.levels && exact_type.eq_ignore_ascii_case("floor") {
                let floor = PlaceParent {
                    twin_id: target_id,
                    dtmi: target_dtmi,
                    relationship: String::new(),
                };
                self.sync_levels(&mapping.mapped_id, floor).await;
            }
        })
    }

    fn add_place_point(&mut self, point: &Value, place_id: &str, place_dtmi: Option<&str>) {
        let Some(mapping) = self.twin_mapping(point) else {
            return;
        };
        let Some(exact_type) = point.get("exactType").map(value_text) else {
            return;
        };
        self.session
            .add_twin(point, mapping.twin_id(), &exact_type, true);
        self.session.add_relationship(
            place_id,
            place_dtmi,
            relationship_types::HAS_POINT,
            mapping.twin_id(),
            &exact_type,
            IndexMap::new(),
        );
    }

    /// Expand a floor with its own query
    async fn sync_levels(&mut self, floor_mapped_id: &str, floor: PlaceParent) {
        let query = self.input_graph.get_floor_query(floor_mapped_id);
        let Some(document) = self.input_graph.get_twin_graph(&query).await else {
            return;
        };

        let floor_elements: Vec<&Value> = collection_items(&document).map(|(_, f)| f).collect();
        for floor_element in floor_elements {
            let Some(fields) = floor_element.as_object() else {
                continue;
            };
            for (name, value) in fields {
                let parent = PlaceParent {
                    relationship: name.clone(),
                    twin_id: floor.twin_id.clone(),
                    dtmi: floor.dtmi.clone(),
                };
                match value {
                    Value::Array(items) => {
                        for item in items {
                            self.get_places(item, Some(&parent)).await;
                        }
                    }
                    Value::Object(_) => self.get_places(value, Some(&parent)).await,
                    _ => {}
                }
            }
        }
    }

    /// Points of the collected things, queried in batches ordered by twin id
    async fn get_points(&mut self, mut things: IndexMap<String, TwinMapping>) {
        if !self.session.entity_types.points {
            return;
        }
        things.sort_keys();

        let batches: Vec<Vec<String>> = things
            .values()
            .map(|mapping| mapping.mapped_id.clone())
            .collect::<Vec<_>>()
            .chunks(self.thing_query_batch_size)
            .map(<[String]>::to_vec)
            .collect();

        for batch in batches {
            let query = self.input_graph.get_points_for_things_query(&batch);
            let Some(document) = self.input_graph.get_twin_graph(&query).await else {
                continue;
            };
            for (_, thing) in collection_items(&document) {
                self.add_thing_points(thing);
            }
        }
    }

    fn add_thing_points(&mut self, thing: &Value) {
        let Some(mapping) = self.twin_mapping(thing) else {
            return;
        };
        let thing_id = mapping.twin_id();
        let Some(thing_dtmi) = self
            .session
            .twins
            .get(thing_id)
            .map(|twin| twin.model_id().to_string())
        else {
            warn!(twin_id = thing_id, "Thing twin not found in batch");
            self.session
                .errors
                .record(thing_id, "Thing twin not found in twins collection");
            return;
        };

        let point_lists = thing
            .as_object()
            .into_iter()
            .flat_map(|fields| fields.values())
            .filter_map(Value::as_array);

        for point in point_lists.flatten() {
            let Some(point_mapping) = self.twin_mapping(point) else {
                continue;
            };
            if point.get("unused").and_then(Value::as_bool) == Some(true) {
                debug!(twin_id = point_mapping.twin_id(), "Skipping unused point");
                continue;
            }
            let Some(exact_type) = point.get("exactType").map(value_text) else {
                continue;
            };

            let point_id = point_mapping.twin_id();
            let point_dtmi = self.session.add_twin(point, point_id, &exact_type, true);
            self.session.add_relationship(
                thing_id,
                Some(&thing_dtmi),
                relationship_types::HAS_POINT,
                point_id,
                &exact_type,
                IndexMap::new(),
            );

            if let Some(billed_to) = point
                .get(relationship_types::IS_BILLED_TO)
                .filter(|b| b.is_object())
            {
                let Some(billed_mapping) = self.twin_mapping(billed_to) else {
                    continue;
                };
                let Some(billed_type) = billed_to.get("exactType").map(value_text) else {
                    continue;
                };
                self.session
                    .add_twin(billed_to, billed_mapping.twin_id(), &billed_type, true);
                self.session.add_relationship(
                    point_id,
                    point_dtmi.as_deref(),
                    relationship_types::IS_BILLED_TO,
                    billed_mapping.twin_id(),
                    &billed_type,
                    IndexMap::new(),
                );
            }
        }
    }

    /// Connector twin, with `servedBy` from its building when there is one
    fn add_connector(&mut self, connector: &Value, building: Option<&Twin>) {
        let Some(mapping) = self.twin_mapping(connector) else {
            return;
        };
        let connector_id = mapping.twin_id().to_string();

        let mut twin = Twin::new(connector_id.as_str(), CONNECTOR_MODEL_ID);
        if let Some(name) = connector.get("name") {
            let name = match value_text(name) {
                text if name.is_null() || text.trim().is_empty() => "None".to_string(),
                text => text,
            };
            twin.contents.insert("name".to_string(), Value::String(name));
        }
        twin.contents.insert(
            "siteID".to_string(),
            Value::String(self.session.site_id.clone()),
        );
        if let Some(connector_type) = connector.get("connectorType").and_then(Value::as_object) {
            let mut summary = serde_json::Map::new();
            for field in ["id", "name", "version", "direction"] {
                summary.insert(
                    field.to_string(),
                    connector_type.get(field).cloned().unwrap_or(Value::Null),
                );
            }
            twin.contents
                .insert("connectorType".to_string(), Value::Object(summary));
        }
        self.session.twins.insert(connector_id.clone(), twin);

        if let Some(building) = building {
            self.session.add_relationship(
                &building.id,
                Some(building.model_id()),
                relationship_types::SERVED_BY,
                &connector_id,
                CONNECTOR_MODEL_ID,
                IndexMap::new(),
            );
        }
    }
}

fn is_point_collection(name: &str) -> bool {
    matches!(name, "points" | "hasPoints" | "hasPoint")
}
