//! Ingestion pipeline integration tests

mod common;

use anyhow::Result;
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::sync::Arc;

use common::*;
use twin_topology_ingestion::ingestion::vocabulary::{CONNECTOR_MODEL_ID, LEVEL_MODEL_ID};
use twin_topology_ingestion::ingestion::EntityTypes;
use twin_topology_ingestion::ontology::{
    FillProperty, InterfaceRemap, ObjectTransformation, PropertyProjection,
};
use twin_topology_ingestion::output::StoreCall;
use twin_topology_ingestion::{
    FixtureInputGraph, GraphIngestionProcessor, IngestionError, IngestionOptions,
    LoadedOntologyMapping, MappedEntryStatus, OntologyMapping, SyncPhase, SyncSession,
    TargetModelSet,
};

fn session_with(mapping: OntologyMapping) -> Result<SyncSession> {
    let targets = TargetModelSet::from_documents(&target_models())?;
    let mut session = SyncSession::new(
        Arc::new(LoadedOntologyMapping::compile(mapping)?),
        Arc::new(targets),
        Arc::new(FixtureInputGraph::new(interface_types())),
        EntityTypes::for_phase(SyncPhase::Points),
    );
    session.site_id = SITE_ID.to_string();
    Ok(session)
}

fn session() -> Result<SyncSession> {
    session_with(ontology_mapping())
}

fn spatial_graph() -> FixtureInputGraph {
    FixtureInputGraph::new(interface_types())
        .with_response("building:BLDG1", building_response())
        .with_response("floor:FLR1", floor_response())
}

#[cfg(test)]
mod twin_construction {
    use super::*;

    #[test]
    fn test_fill_property_names_the_twin() -> Result<()> {
        let mut session = session()?;
        let source = json!({"id": "X", "name": "AV 31", "exactType": "TemperatureAlarmSetpoint"});

        let model = session.add_twin(&source, "X", "TemperatureAlarmSetpoint", false);

        assert_eq!(model.as_deref(), Some(SPACE));
        let twin = &session.twins["X"];
        assert_eq!(twin.model_id(), SPACE);
        assert_eq!(twin.contents["name"], "AV 31");
        assert_eq!(twin.contents["externalID"], "X");
        assert_eq!(twin.contents["siteID"], SITE_ID);
        Ok(())
    }

    #[test]
    fn test_fill_property_falls_through_to_description() -> Result<()> {
        let mut session = session()?;
        let source = json!({
            "id": "X",
            "name": null,
            "description": "test",
            "exactType": "TemperatureAlarmSetpoint"
        });

        session.add_twin(&source, "X", "TemperatureAlarmSetpoint", false);

        assert_eq!(session.twins["X"].contents["name"], "test");
        Ok(())
    }

    #[test]
    fn test_projection_collects_external_ids() -> Result<()> {
        let mut session = session()?;
        let source = json!({
            "id": "X",
            "name": "AV 31",
            "mappingKey": "12345",
            "deviceId": 678
        });

        session.add_twin(&source, "X", "TemperatureAlarmSetpoint", false);

        assert_eq!(
            session.twins["X"].contents["externalIds"],
            json!({"mappingKey": "12345", "deviceId": "678"})
        );
        Ok(())
    }

    #[test]
    fn test_object_transformation_flattens_unit() -> Result<()> {
        let mut session = session()?;

        session.add_twin(
            &json!({"id": "P1", "name": "Temp", "unit": {"id": "A"}}),
            "P1",
            "TemperatureSensor",
            true,
        );
        session.add_twin(
            &json!({"id": "P2", "name": "Temp", "unit": null}),
            "P2",
            "TemperatureSensor",
            true,
        );

        assert_eq!(session.twins["P1"].contents["unit"], "A");
        assert!(!session.twins["P2"].contents.contains_key("unit"));
        Ok(())
    }

    fn unit_rule(input_property: &str, priority: i32) -> ObjectTransformation {
        ObjectTransformation {
            input_property: input_property.into(),
            input_property_name: "id".into(),
            output_property_name: "unit".into(),
            priority,
            output_dtmi_filter: ".*".into(),
        }
    }

    fn unit_of(rules: Vec<ObjectTransformation>, source: Value) -> Result<Option<Value>> {
        let mut session = session_with(OntologyMapping {
            object_transformations: rules,
            ..ontology_mapping()
        })?;
        session.add_twin(&source, "P1", "TemperatureSensor", true);
        Ok(session.twins["P1"].contents.get("unit").cloned())
    }

    #[test]
    fn test_object_transformation_with_absent_input_yields_to_the_next() -> Result<()> {
        let rules = vec![unit_rule("engUnit", 1), unit_rule("unitObj", 2)];

        let unit = unit_of(rules.clone(), json!({"id": "P1", "unitObj": {"id": "A"}}))?;
        assert_eq!(unit, Some(json!("A")));

        let unit = unit_of(rules, json!({"id": "P1", "engUnit": null, "unitObj": {"id": "A"}}))?;
        assert_eq!(unit, Some(json!("A")));
        Ok(())
    }

    #[test]
    fn test_object_transformations_apply_in_ascending_priority() -> Result<()> {
        let source = json!({"id": "P1", "engUnit": {"id": "degC"}, "unitObj": {"id": "A"}});

        let unit = unit_of(vec![unit_rule("unitObj", 2), unit_rule("engUnit", 1)], source.clone())?;
        assert_eq!(unit, Some(json!("A")));

        let unit = unit_of(vec![unit_rule("unitObj", 1), unit_rule("engUnit", 2)], source)?;
        assert_eq!(unit, Some(json!("degC")));
        Ok(())
    }

    #[test]
    fn test_equal_priority_object_transformations_keep_declaration_order() -> Result<()> {
        let source = json!({"id": "P1", "engUnit": {"id": "degC"}, "unitObj": {"id": "A"}});

        let unit = unit_of(vec![unit_rule("engUnit", 1), unit_rule("unitObj", 1)], source.clone())?;
        assert_eq!(unit, Some(json!("A")));

        let unit = unit_of(vec![unit_rule("unitObj", 1), unit_rule("engUnit", 1)], source)?;
        assert_eq!(unit, Some(json!("degC")));
        Ok(())
    }

    #[test]
    fn test_object_without_the_field_keeps_earlier_value() -> Result<()> {
        let rules = vec![unit_rule("engUnit", 1), unit_rule("unitObj", 2)];

        let unit = unit_of(rules, json!({"id": "P1", "engUnit": {"id": "degC"}, "unitObj": {}}))?;
        assert_eq!(unit, Some(json!("degC")));
        Ok(())
    }

    #[test]
    fn test_unparsable_output_dtmi_is_recorded_under_twin_id() -> Result<()> {
        let mapping = OntologyMapping {
            interface_remaps: vec![InterfaceRemap {
                input_dtmi: "dtmi:org:brickschema:schema:Brick:Room;1".into(),
                output_dtmi: "willow-room".into(),
            }],
            ..ontology_mapping()
        };
        let mut session = session_with(mapping)?;

        let model = session.add_twin(&json!({"id": "RM9", "name": "Room 9"}), "RM9", "Room", false);

        assert!(model.is_none());
        assert!(!session.twins.contains_key("RM9"));
        let message = session.errors.get("RM9").unwrap_or_default();
        assert!(message.contains("willow-room"), "{message}");
        assert!(!session.errors.contains("willow-room"));
        Ok(())
    }

    #[test]
    fn test_later_rule_categories_overwrite_earlier_ones() -> Result<()> {
        let mapping = OntologyMapping {
            fill_properties: vec![FillProperty {
                input_property_names: vec!["name".into()],
                output_dtmi_filter: ".*".into(),
                output_property_name: "name".into(),
            }],
            property_projections: vec![PropertyProjection {
                input_property_names: vec!["code".into()],
                output_dtmi_filter: ".*".into(),
                output_property_name: "name".into(),
                is_output_property_collection: false,
            }],
            object_transformations: vec![ObjectTransformation {
                input_property: "display".into(),
                input_property_name: "text".into(),
                output_property_name: "name".into(),
                priority: 1,
                output_dtmi_filter: ".*".into(),
            }],
            ..ontology_mapping()
        };
        let mut session = session_with(mapping)?;

        let sources = [
            ("A", json!({"name": "filled", "code": "projected", "display": {"text": "transformed"}})),
            ("B", json!({"name": "filled", "code": "projected"})),
            ("C", json!({"name": "filled"})),
        ];
        for (id, source) in &sources {
            session.add_twin(source, id, "Room", false);
        }

        assert_eq!(session.twins["A"].contents["name"], "transformed");
        assert_eq!(session.twins["B"].contents["name"], "projected");
        assert_eq!(session.twins["C"].contents["name"], "filled");
        Ok(())
    }

    #[test]
    fn test_sensor_point_gets_capability_defaults() -> Result<()> {
        let mut session = session()?;
        let source = json!({
            "id": "PT1",
            "name": "Zone Temp",
            "datatype": "INT",
            "mappingKey": "mtp://CONN7@gateway/PT1",
            "identities": [{
                "__typename": "ExternalIdentity",
                "scope": "CONNECTOR",
                "scopeId": "CONN7",
                "value": "AV-31",
                "dateCreated": "2024-02-01T10:00:00+01:00"
            }]
        });

        session.add_twin(&source, "PT1", "TemperatureSensor", true);

        let contents = &session.twins["PT1"].contents;
        assert_eq!(contents["type"], "multiState");
        assert_eq!(contents["trendInterval"], 900);
        assert_eq!(contents["mappedConnectorId"], "CONN7");
        assert_eq!(
            contents["mappedIds"],
            json!([{
                "exactType": "ExternalIdentity",
                "scope": "CONNECTOR",
                "scopeId": "CONN7",
                "value": "AV-31",
                "dateCreated": "2024-02-01T09:00:00.000Z"
            }])
        );
        Ok(())
    }

    #[test]
    fn test_input_dtmi_known_to_targets_is_kept() -> Result<()> {
        let mapping = OntologyMapping {
            interface_remaps: vec![InterfaceRemap {
                input_dtmi: ROOM.into(),
                output_dtmi: SPACE.into(),
            }],
            ..ontology_mapping()
        };
        let types = interface_types().with_type("WillowRoom", ROOM);
        let mut session = SyncSession::new(
            Arc::new(LoadedOntologyMapping::compile(mapping)?),
            Arc::new(TargetModelSet::from_documents(&target_models())?),
            Arc::new(FixtureInputGraph::new(types)),
            EntityTypes::for_phase(SyncPhase::Spatial),
        );

        assert_eq!(session.resolve_output_dtmi("WillowRoom").as_deref(), Some(ROOM));
        assert_eq!(
            session.resolve_output_dtmi(CONNECTOR_MODEL_ID).as_deref(),
            Some(CONNECTOR_MODEL_ID)
        );
        assert!(session.errors.is_empty());
        Ok(())
    }

    #[test]
    fn test_reversed_relationship_swaps_endpoints() -> Result<()> {
        let mut session = session()?;

        let id = session.add_relationship(
            "RM1",
            Some(ROOM),
            "hasPoint",
            "PT1",
            "TemperatureSensor",
            IndexMap::new(),
        );

        assert_eq!(id.as_deref(), Some("PT1-RM1-isCapabilityOf"));
        let relationship = &session.relationships["PT1-RM1-isCapabilityOf"];
        assert_eq!(relationship.source_id, "PT1");
        assert_eq!(relationship.target_id, "RM1");
        Ok(())
    }
}

#[cfg(test)]
mod phases {
    use super::*;

    #[tokio::test]
    async fn test_spatial_sync_stages_new_places() -> Result<()> {
        let harness = Harness::new(spatial_graph());

        let report = harness.processor.sync_spatial(BUILDING_ID, false).await?;

        assert_eq!(report.phase, SyncPhase::Spatial);
        assert_eq!(report.twins, 5);
        assert_eq!(report.relationships, 4);
        assert_eq!(report.relationships_pruned, 0);
        assert_eq!(report.upload.twins_unchanged, 1);
        assert_eq!(report.upload.mappings_added, 4);
        assert_eq!(report.upload.relationships_skipped, 4);
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert!(harness.store.writes().is_empty());

        let staged: Vec<String> = harness
            .mapping_client
            .entries()
            .into_iter()
            .map(|entry| entry.mapped_id)
            .collect();
        assert_eq!(staged, vec!["FLR1", "RM1", "PT1", "RM2"]);

        let point = harness.mapping_client.record("PT1").expect("point staged");
        assert_eq!(point.status, MappedEntryStatus::Pending);
        assert_eq!(point.parent_mapped_id, "RM1");
        assert_eq!(point.willow_parent_rel.as_deref(), Some("isCapabilityOf"));
        assert_eq!(point.unit, "degC");
        assert_eq!(point.data_type, "analog");
        assert_eq!(point.building_id, BUILDING_ID);
        Ok(())
    }

    #[tokio::test]
    async fn test_spatial_sync_walks_floor_query() -> Result<()> {
        let harness = Harness::new(spatial_graph());

        harness.processor.sync_spatial(BUILDING_ID, false).await?;

        assert_eq!(
            harness.input_graph.queries(),
            vec!["connectors", "building:BLDG1", "floor:FLR1"]
        );
        let room = harness.mapping_client.record("RM2").expect("room staged");
        assert_eq!(room.parent_mapped_id, "FLR1");
        assert_eq!(room.willow_parent_rel.as_deref(), Some("isPartOf"));
        Ok(())
    }

    #[tokio::test]
    async fn test_approved_entry_is_created_then_left_alone() -> Result<()> {
        let harness = Harness::new(spatial_graph());
        harness.processor.sync_spatial(BUILDING_ID, false).await?;
        assert!(harness.mapping_client.approve("FLR1"));

        let report = harness.processor.sync_spatial(BUILDING_ID, false).await?;

        assert_eq!(report.upload.twins_created, 1);
        assert_eq!(report.upload.mappings_pending, 3);
        assert_eq!(report.upload.relationships_upserted, 1);
        assert_eq!(report.upload.relationships_skipped, 3);

        let floor = harness.store.twin("FLR1").expect("floor created");
        assert_eq!(floor.model_id(), LEVEL_MODEL_ID);
        assert_eq!(floor.contents["name"], "L1");
        assert_eq!(floor.contents["siteID"], SITE_ID);
        assert!(harness.store.relationship("FLR1-BLDG-TWIN-isPartOf").is_some());
        assert_eq!(
            harness.mapping_client.entry("FLR1").map(|entry| entry.status),
            Some(MappedEntryStatus::Created)
        );

        harness.store.clear_calls();
        let report = harness.processor.sync_spatial(BUILDING_ID, false).await?;

        assert_eq!(report.upload.twins_created, 0);
        assert_eq!(report.upload.twins_unchanged, 2);
        assert_eq!(report.upload.relationships_unchanged, 1);
        assert!(harness.store.writes().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() -> Result<()> {
        let mut harness = Harness::new(spatial_graph());
        harness.processor = harness.processor.with_dry_run(true);

        let report = harness.processor.sync_spatial(BUILDING_ID, false).await?;

        assert_eq!(report.upload.mappings_added, 4);
        assert!(harness.store.writes().is_empty());
        assert!(harness.mapping_client.writes().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_building_records_error() -> Result<()> {
        let harness = Harness::new(spatial_graph());

        let report = harness.processor.sync_spatial("NOPE", false).await?;

        assert_eq!(report.twins, 0);
        assert_eq!(
            report.errors.get("NOPE"),
            Some("Willow building not found for mapped building id")
        );
        assert!(harness.input_graph.queries().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_things_and_points() -> Result<()> {
        let graph = FixtureInputGraph::new(interface_types())
            .with_response(
                "buildingThings:BLDG1:CONN7",
                json!({"data": {"buildings": [{"things": [{
                    "id": "AHU1",
                    "exactType": "AirHandlingUnit",
                    "name": "AHU 1",
                    "mappingKey": "mtp://CONN7@gateway/AHU1",
                    "hasLocation": {"id": "RM1", "exactType": "Room"},
                    "isFedBy": [{
                        "id": "AHU0",
                        "exactType": "AirHandlingUnit",
                        "properties": {"medium": "air", "order": 1}
                    }],
                    "serves": [{"id": "RM3", "exactType": "Room", "name": "Room 3"}]
                }]}]}}),
            )
            .with_response(
                "pointsForThings:AHU1",
                json!({"data": {"things": [{
                    "id": "AHU1",
                    "points": [
                        {"id": "PT9", "exactType": "TemperatureSensor", "name": "SAT", "unit": {"id": "degC"}},
                        {"id": "PT10", "exactType": "TemperatureSensor", "name": "Spare", "unused": true}
                    ]
                }]}}),
            );
        let harness = Harness::new(graph);

        let things = harness.processor.sync_things(BUILDING_ID, "CONN7", true).await?;

        assert_eq!(things.twins, 3);
        assert_eq!(things.relationships, 3);
        assert_eq!(
            things.upload.skipped_twin_ids,
            vec!["AHU1".to_string(), "RM3".to_string()]
        );
        assert!(!harness
            .input_graph
            .queries()
            .iter()
            .any(|query| query.starts_with("pointsForThings")));

        let points = harness.processor.sync_points(BUILDING_ID, "CONN7", true).await?;

        assert_eq!(points.phase, SyncPhase::Points);
        assert_eq!(points.twins, 4);
        assert_eq!(points.relationships, 4);
        let point = harness.mapping_client.record("PT9").expect("point staged");
        assert_eq!(point.unit, "degC");
        assert_eq!(point.connector_id, "CONN7");
        assert_eq!(point.parent_mapped_id, "AHU1");
        assert!(harness.mapping_client.record("PT10").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_organization_sync() -> Result<()> {
        let connector = json!({
            "id": "CONN7",
            "name": "BACnet gateway",
            "connectorType": {"id": "ct-1", "name": "bacnet", "version": "2", "direction": "INBOUND", "icon": "x"}
        });
        let graph = FixtureInputGraph::new(interface_types())
            .with_response(
                "organization",
                json!({"data": {"sites": [{"id": "SITE-SRC", "exactType": "Site", "name": "Campus"}]}}),
            )
            .with_response(
                "buildingsForSite:SITE-SRC",
                json!({"data": {"sites": [{
                    "id": "SITE-SRC",
                    "exactType": "Site",
                    "buildings": [{
                        "id": BUILDING_ID,
                        "exactType": "Building",
                        "name": "HQ",
                        "identities": [twin_identity(BUILDING_TWIN_ID)]
                    }]
                }]}}),
            )
            .with_response(
                "buildingConnectors:BLDG1",
                json!({"data": {"buildings": [{"connectors": [connector]}]}}),
            )
            .with_response(
                "connectors",
                json!({"data": {"connectors": [
                    connector,
                    {"id": "WLW", "name": " ", "connectorTypeId": "willow-source"}
                ]}}),
            );
        let harness = Harness::new(graph);

        let report = harness.processor.sync_organization(false).await?;

        assert_eq!(
            harness.input_graph.queries(),
            vec![
                "organization",
                "connectors",
                "buildingsForSite:SITE-SRC",
                "buildingConnectors:BLDG1",
                "connectors",
                "accounts"
            ]
        );
        assert_eq!(report.twins, 3);
        assert_eq!(report.upload.twins_unchanged, 1);
        assert_eq!(report.upload.mappings_added, 2);
        assert_eq!(report.upload.relationships_skipped, 1);
        assert_eq!(
            report.errors.get("Processing Error"),
            Some("No accounts found for this organization")
        );

        let connector = harness.mapping_client.record("CONN7").expect("connector staged");
        assert_eq!(connector.willow_model_id, CONNECTOR_MODEL_ID);
        assert_eq!(connector.parent_mapped_id, BUILDING_ID);
        assert_eq!(connector.parent_willow_id, BUILDING_TWIN_ID);
        assert_eq!(connector.willow_parent_rel.as_deref(), Some("servedBy"));
        assert_eq!(harness.mapping_client.record("WLW").map(|r| r.name), Some("None".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_connectors_sync_creates_with_unique_id() -> Result<()> {
        let graph = FixtureInputGraph::new(interface_types()).with_response(
            "buildingConnectors:BLDG1",
            json!({"data": {"buildings": [{"connectors": [{"id": "CONN7", "name": "Gateway"}]}]}}),
        );
        let harness = Harness::new(graph);
        harness.processor.sync_connectors(BUILDING_ID, false).await?;
        assert!(harness.mapping_client.approve("CONN7"));

        let report = harness.processor.sync_connectors(BUILDING_ID, false).await?;

        assert_eq!(report.upload.twins_created, 1);
        assert_eq!(report.upload.relationships_upserted, 1);
        let connector = harness.store.twin("CONN7").expect("connector created");
        assert_eq!(connector.model_id(), CONNECTOR_MODEL_ID);
        assert_eq!(connector.contents["siteID"], SITE_ID);
        let unique_id = connector.content_string("uniqueID").expect("unique id");
        assert!(uuid::Uuid::parse_str(&unique_id).is_ok());
        assert!(harness
            .store
            .relationship("BLDG-TWIN-CONN7-servedBy")
            .is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_mapping_aborts_phase() -> Result<()> {
        let mapping = OntologyMapping {
            fill_properties: vec![FillProperty {
                input_property_names: vec!["name".into()],
                output_dtmi_filter: "(".into(),
                output_property_name: "name".into(),
            }],
            ..ontology_mapping()
        };
        let harness = Harness::new(spatial_graph());
        let output_graph = Arc::new(graph_manager(
            &harness.store,
            &harness.mapping_client,
            IngestionOptions::default(),
        ));
        let processor = GraphIngestionProcessor::new(
            ontology_manager(mapping),
            harness.input_graph.clone(),
            output_graph,
            IngestionOptions::default(),
        );

        let result = processor.sync_spatial(BUILDING_ID, false).await;

        assert!(matches!(result, Err(IngestionError::Ontology(_))));
        assert!(!harness.store.calls().contains(&StoreCall::GetModels));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_options_abort_phase() -> Result<()> {
        let options = IngestionOptions {
            twin_batch_size: 0,
            ..IngestionOptions::default()
        };
        let harness = Harness::new(spatial_graph());
        let processor = GraphIngestionProcessor::new(
            ontology_manager(ontology_mapping()),
            harness.input_graph.clone(),
            Arc::new(graph_manager(
                &harness.store,
                &harness.mapping_client,
                IngestionOptions::default(),
            )),
            options,
        );

        let result = processor.sync_spatial(BUILDING_ID, false).await;

        assert!(matches!(result, Err(IngestionError::Config(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_report_serializes_for_callers() -> Result<()> {
        let harness = Harness::new(spatial_graph());

        let report = harness.processor.sync_spatial(BUILDING_ID, false).await?;
        let value: Value = serde_json::to_value(&report)?;

        assert_eq!(value["phase"], "spatial");
        assert_eq!(value["upload"]["mappingsAdded"], 4);
        Ok(())
    }
}
