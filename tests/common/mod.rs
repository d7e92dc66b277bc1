//! Shared fixtures for the integration tests
//!
//! A small target ontology (building, level, rooms, equipment, capabilities
//! and connectors), the mapping that feeds it from Brick-typed source data,
//! and a building `BLDG1` already stored as twin `BLDG-TWIN`.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;

use twin_topology_ingestion::ingestion::vocabulary::{
    BUILDING_MODEL_ID, CONNECTOR_MODEL_ID, LEVEL_MODEL_ID,
};
use twin_topology_ingestion::ontology::{
    FillProperty, InterfaceRemap, ObjectTransformation, PropertyProjection, RelationshipRemap,
};
use twin_topology_ingestion::{
    DigitalTwinGraphManager, FixtureInputGraph, GraphIngestionProcessor, InMemoryMappingClient,
    InMemoryTwinStore, IngestionOptions, InterfaceTypeTable, OntologyMapping,
    OntologyMappingManager, StaticOntologyMappingLoader, Twin,
};

pub const SPACE: &str = "dtmi:org:w3id:rec:Space;1";
pub const ROOM: &str = "dtmi:com:willowinc:Room;1";
pub const EQUIPMENT: &str = "dtmi:com:willowinc:Equipment;1";
pub const CAPABILITY: &str = "dtmi:com:willowinc:Capability;1";
pub const SENSOR: &str = "dtmi:com:willowinc:TemperatureSensor;1";

pub const BUILDING_ID: &str = "BLDG1";
pub const BUILDING_TWIN_ID: &str = "BLDG-TWIN";
pub const SITE_ID: &str = "SITE-1";

fn brick(name: &str) -> String {
    format!("dtmi:org:brickschema:schema:Brick:{name};1")
}

fn properties(names: &[&str]) -> Vec<Value> {
    names
        .iter()
        .map(|name| json!({"@type": "Property", "name": name}))
        .collect()
}

/// Target ontology as returned by the twin store
pub fn target_models() -> Vec<Value> {
    vec![json!([
        {"@id": BUILDING_MODEL_ID, "@type": "Interface",
         "contents": properties(&["name", "externalID", "siteID"])},
        {"@id": LEVEL_MODEL_ID, "@type": "Interface",
         "contents": properties(&["name", "externalID", "siteID"])},
        {"@id": SPACE, "@type": "Interface",
         "contents": properties(&["name", "description", "externalID", "externalIds"])},
        {"@id": ROOM, "@type": "Interface", "extends": SPACE},
        {"@id": EQUIPMENT, "@type": "Interface",
         "contents": properties(&["name", "externalID", "externalIds"])},
        {"@id": CAPABILITY, "@type": "Interface",
         "contents": properties(&["name", "externalID", "unit", "type", "trendInterval"])},
        {"@id": SENSOR, "@type": "Interface", "extends": CAPABILITY},
        {"@id": CONNECTOR_MODEL_ID, "@type": "Interface",
         "contents": properties(&["name", "siteID", "connectorType"])}
    ])]
}

/// Source type names and their Brick DTMIs
pub fn interface_types() -> InterfaceTypeTable {
    [
        "Building",
        "Floor",
        "Room",
        "Site",
        "AirHandlingUnit",
        "TemperatureSensor",
        "TemperatureAlarmSetpoint",
    ]
    .into_iter()
    .fold(InterfaceTypeTable::new(), |table, name| {
        let dtmi = match name {
            "AirHandlingUnit" => brick("Air_Handling_Unit"),
            "TemperatureSensor" => brick("Temperature_Sensor"),
            "TemperatureAlarmSetpoint" => brick("Temperature_Alarm_Setpoint"),
            other => brick(other),
        };
        table.with_type(name, dtmi)
    })
}

pub fn ontology_mapping() -> OntologyMapping {
    let remap = |input: &str, output: &str| InterfaceRemap {
        input_dtmi: brick(input),
        output_dtmi: output.to_string(),
    };
    let reversed = |input: &str, output: &str| RelationshipRemap {
        input_relationship: input.to_string(),
        output_relationship: output.to_string(),
        reverse_relationship_direction: true,
    };

    OntologyMapping {
        interface_remaps: vec![
            remap("Building", BUILDING_MODEL_ID),
            remap("Floor", LEVEL_MODEL_ID),
            remap("Room", ROOM),
            remap("Air_Handling_Unit", EQUIPMENT),
            remap("Temperature_Sensor", SENSOR),
            remap("Temperature_Alarm_Setpoint", SPACE),
        ],
        relationship_remaps: vec![
            reversed("hasPart", "isPartOf"),
            reversed("hasPoint", "isCapabilityOf"),
            reversed("isLocationOf", "isLocatedIn"),
        ],
        fill_properties: vec![
            FillProperty {
                input_property_names: vec!["name".into(), "description".into()],
                output_dtmi_filter: ".*".into(),
                output_property_name: "name".into(),
            },
            FillProperty {
                input_property_names: vec!["id".into()],
                output_dtmi_filter: ".*".into(),
                output_property_name: "externalID".into(),
            },
        ],
        property_projections: vec![PropertyProjection {
            input_property_names: vec!["mappingKey".into(), "deviceId".into()],
            output_dtmi_filter: ".*".into(),
            output_property_name: "externalIds".into(),
            is_output_property_collection: true,
        }],
        object_transformations: vec![ObjectTransformation {
            input_property: "unit".into(),
            input_property_name: "id".into(),
            output_property_name: "unit".into(),
            priority: 1,
            output_dtmi_filter: "Capability".into(),
        }],
        ..Default::default()
    }
}

pub fn ontology_manager(mapping: OntologyMapping) -> Arc<OntologyMappingManager> {
    Arc::new(OntologyMappingManager::new(Arc::new(
        StaticOntologyMappingLoader::new(mapping),
    )))
}

/// The building twin as the store holds it
pub fn stored_building() -> Twin {
    Twin::new(BUILDING_TWIN_ID, BUILDING_MODEL_ID)
        .with_content("name", json!("HQ"))
        .with_content("externalID", json!(BUILDING_ID))
        .with_content("siteID", json!(SITE_ID))
        .with_content("mappedIds", json!([]))
}

/// Identity naming an existing twin
pub fn twin_identity(twin_id: &str) -> Value {
    json!({
        "scope": "ORG",
        "value": format!("urn:willowinc:twin:id:{twin_id}"),
        "dateCreated": "2024-01-01T00:00:00Z"
    })
}

/// `BLDG1` with one floor holding a room and a sensor
pub fn building_response() -> Value {
    json!({"data": {"buildings": [{
        "id": BUILDING_ID,
        "exactType": "Building",
        "name": "HQ",
        "identities": [twin_identity(BUILDING_TWIN_ID)],
        "hasPart": [{
            "id": "FLR1",
            "exactType": "Floor",
            "name": "L1",
            "hasPart": [{
                "id": "RM1",
                "exactType": "Room",
                "name": "Room 1",
                "hasPoint": [{
                    "id": "PT1",
                    "exactType": "TemperatureSensor",
                    "name": "Zone Temp",
                    "unit": {"id": "degC"},
                    "datatype": "float",
                    "mappingKey": "mtp://CONN7@gateway/PT1"
                }]
            }]
        }]
    }]}})
}

/// Extra spaces returned by the per-floor query
pub fn floor_response() -> Value {
    json!({"data": {"floors": [{
        "hasPart": [{"id": "RM2", "exactType": "Room", "name": "Room 2"}]
    }]}})
}

/// The in-memory world a processor runs against
pub struct Harness {
    pub store: Arc<InMemoryTwinStore>,
    pub mapping_client: Arc<InMemoryMappingClient>,
    pub input_graph: Arc<FixtureInputGraph>,
    pub processor: GraphIngestionProcessor,
}

impl Harness {
    pub fn new(input_graph: FixtureInputGraph) -> Self {
        Self::with_options(input_graph, IngestionOptions::default())
    }

    pub fn with_options(input_graph: FixtureInputGraph, options: IngestionOptions) -> Self {
        let store = Arc::new(
            InMemoryTwinStore::new()
                .with_models(target_models())
                .with_twins([stored_building()]),
        );
        let mapping_client = Arc::new(InMemoryMappingClient::new());
        let input_graph = Arc::new(input_graph);
        let output_graph = Arc::new(
            DigitalTwinGraphManager::new(store.clone(), mapping_client.clone(), options.clone())
                .expect("valid options"),
        );
        let processor = GraphIngestionProcessor::new(
            ontology_manager(ontology_mapping()),
            input_graph.clone(),
            output_graph,
            options,
        );

        Self {
            store,
            mapping_client,
            input_graph,
            processor,
        }
    }
}

/// Reconciliation against fresh in-memory stores
pub fn graph_manager(
    store: &Arc<InMemoryTwinStore>,
    mapping_client: &Arc<InMemoryMappingClient>,
    options: IngestionOptions,
) -> DigitalTwinGraphManager {
    DigitalTwinGraphManager::new(store.clone(), mapping_client.clone(), options)
        .expect("valid options")
}
