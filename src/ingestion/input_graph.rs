//! Source graph access
//!
//! The source system is queried with opaque query strings built by the
//! [`InputGraph`] implementation. Every result has the shape
//! `{"data": {"<collection>": [ ... ]}}`.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Source type name to input DTMI, matched case-insensitively
#[derive(Debug, Clone, Default)]
pub struct InterfaceTypeTable {
    types: HashMap<String, String>,
}

impl InterfaceTypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index DTDL interfaces by `displayName`; documents may be single interfaces or arrays
    pub fn from_documents<'a>(documents: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut table = Self::new();
        for document in documents {
            let interfaces = match document {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            };
            for interface in interfaces {
                let name = interface.get("displayName").and_then(Value::as_str);
                let id = interface.get("@id").and_then(Value::as_str);
                if let (Some(name), Some(id)) = (name, id) {
                    table.insert(name, id);
                }
            }
        }
        table
    }

    /// First registration of a name wins
    pub fn insert(&mut self, type_name: &str, dtmi: impl Into<String>) {
        self.types
            .entry(type_name.to_lowercase())
            .or_insert_with(|| dtmi.into());
    }

    pub fn with_type(mut self, type_name: &str, dtmi: impl Into<String>) -> Self {
        self.insert(type_name, dtmi);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&str> {
        if type_name.trim().is_empty() {
            return None;
        }
        self.types.get(&type_name.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// The source graph
#[async_trait]
pub trait InputGraph: Send + Sync {
    /// Sites of the organization with their place hierarchy
    fn get_organization_query(&self) -> String;

    fn get_accounts_query(&self) -> String;

    fn get_connectors_query(&self) -> String;

    fn get_buildings_for_site_query(&self, site_id: &str) -> String;

    /// One building with its place hierarchy
    fn get_building_query(&self, building_id: &str) -> String;

    fn get_building_connectors_query(&self, building_id: &str) -> String;

    /// Things of a building, optionally restricted to one connector
    fn get_building_things_query(&self, building_id: &str, connector_id: &str) -> String;

    fn get_points_for_things_query(&self, thing_ids: &[String]) -> String;

    fn get_floor_query(&self, floor_id: &str) -> String;

    /// Run a query; `None` when the source had nothing to return or failed
    async fn get_twin_graph(&self, query: &str) -> Option<Value>;

    /// Input DTMI for a source type name
    fn try_get_dtmi(&self, interface_type: &str) -> Option<String>;
}

/// Replays canned query results
///
/// Query strings are stable, readable keys such as `building:BLDG1`, so
/// fixtures can be registered by the same builder methods the processor
/// calls.
#[derive(Default)]
pub struct FixtureInputGraph {
    types: InterfaceTypeTable,
    responses: HashMap<String, Value>,
    queries: Mutex<Vec<String>>,
}

impl FixtureInputGraph {
    pub fn new(types: InterfaceTypeTable) -> Self {
        Self {
            types,
            ..Default::default()
        }
    }

    pub fn with_response(mut self, query: impl Into<String>, response: Value) -> Self {
        self.responses.insert(query.into(), response);
        self
    }

    /// Queries received so far, in order
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl InputGraph for FixtureInputGraph {
    fn get_organization_query(&self) -> String {
        "organization".to_string()
    }

    fn get_accounts_query(&self) -> String {
        "accounts".to_string()
    }

    fn get_connectors_query(&self) -> String {
        "connectors".to_string()
    }

    fn get_buildings_for_site_query(&self, site_id: &str) -> String {
        format!("buildingsForSite:{site_id}")
    }

    fn get_building_query(&self, building_id: &str) -> String {
        format!("building:{building_id}")
    }

    fn get_building_connectors_query(&self, building_id: &str) -> String {
        format!("buildingConnectors:{building_id}")
    }

    fn get_building_things_query(&self, building_id: &str, connector_id: &str) -> String {
        format!("buildingThings:{building_id}:{connector_id}")
    }

    fn get_points_for_things_query(&self, thing_ids: &[String]) -> String {
        format!("pointsForThings:{}", thing_ids.join(","))
    }

    fn get_floor_query(&self, floor_id: &str) -> String {
        format!("floor:{floor_id}")
    }

    async fn get_twin_graph(&self, query: &str) -> Option<Value> {
        self.queries.lock().push(query.to_string());
        match self.responses.get(query) {
            Some(response) => {
                debug!(query, "Replaying fixture");
                Some(response.clone())
            }
            None => {
                warn!(query, "No fixture for query");
                None
            }
        }
    }

    fn try_get_dtmi(&self, interface_type: &str) -> Option<String> {
        self.types.get(interface_type).map(str::to_string)
    }
}

/// Elements of every collection under `data`, in document order
pub(crate) fn collection_items(document: &Value) -> impl Iterator<Item = (&str, &Value)> {
    document
        .as_object()
        .into_iter()
        .flat_map(|top| top.values())
        .filter_map(Value::as_object)
        .flat_map(|data| data.iter())
        .filter_map(|(name, items)| items.as_array().map(|items| (name.as_str(), items)))
        .flat_map(|(name, items)| items.iter().map(move |item| (name, item)))
}
