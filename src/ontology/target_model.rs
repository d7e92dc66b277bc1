//! Target ontology model set
//!
//! Parsed from the DTDL interface documents served by the twin store. Only
//! what ingestion needs is kept: the declared properties, components and
//! relationships of each interface, and the `extends` hierarchy, held as a
//! directed graph with child to parent edges.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::errors::{ModelError, ModelResult};
use crate::value_objects::Dtmi;

/// Interface every point capability derives from
pub const CAPABILITY_MODEL_ID: &str = "dtmi:com:willowinc:Capability;1";

/// One DTDL interface
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelInterface {
    pub id: String,
    pub extends: Vec<String>,
    pub properties: Vec<String>,
    pub components: Vec<String>,
    pub relationships: Vec<String>,
}

/// The set of interfaces known to the target store
#[derive(Debug, Clone, Default)]
pub struct TargetModelSet {
    hierarchy: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
    interfaces: HashMap<String, ModelInterface>,
}

impl TargetModelSet {
    /// Build from model documents, each a single interface or an array of them
    pub fn from_documents<'a>(documents: impl IntoIterator<Item = &'a Value>) -> ModelResult<Self> {
        let mut set = Self::default();
        for document in documents {
            match document {
                Value::Array(items) => {
                    for item in items {
                        set.insert(parse_interface(item)?);
                    }
                }
                Value::Object(_) => set.insert(parse_interface(document)?),
                other => {
                    return Err(ModelError::Shape(format!(
                        "expected an interface object or array, found {other}"
                    )))
                }
            }
        }
        Ok(set)
    }

    /// Build from raw JSON model texts
    pub fn from_json_strs<'a>(documents: impl IntoIterator<Item = &'a str>) -> ModelResult<Self> {
        let values = documents
            .into_iter()
            .map(serde_json::from_str::<Value>)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_documents(&values)
    }

    fn node(&mut self, id: &str) -> NodeIndex {
        if let Some(index) = self.nodes.get(id) {
            return *index;
        }
        let index = self.hierarchy.add_node(id.to_string());
        self.nodes.insert(id.to_string(), index);
        index
    }

    fn insert(&mut self, interface: ModelInterface) {
        let child = self.node(&interface.id);
        // petgraph walks neighbours newest first; insert in reverse to keep declaration order
        for parent in interface.extends.iter().rev() {
            let parent = self.node(parent);
            self.hierarchy.update_edge(child, parent, ());
        }
        self.interfaces.insert(interface.id.clone(), interface);
    }

    pub fn contains(&self, dtmi: &str) -> bool {
        self.interfaces.contains_key(dtmi)
    }

    pub fn get(&self, dtmi: &str) -> Option<&ModelInterface> {
        self.interfaces.get(dtmi)
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// All ancestors of a model, nearest first
    pub fn ancestors(&self, dtmi: &str) -> Vec<String> {
        let Some(start) = self.nodes.get(dtmi) else {
            return Vec::new();
        };

        let mut bfs = Bfs::new(&self.hierarchy, *start);
        let mut ancestors = Vec::new();
        while let Some(index) = bfs.next(&self.hierarchy) {
            if index != *start {
                ancestors.push(self.hierarchy[index].clone());
            }
        }
        ancestors
    }

    pub fn is_child_of(&self, dtmi: &str, ancestor: &str) -> bool {
        self.ancestors(dtmi).iter().any(|a| a == ancestor)
    }

    /// The model is `ancestor` itself or derives from it
    pub fn is_a(&self, dtmi: &str, ancestor: &str) -> bool {
        dtmi == ancestor || self.is_child_of(dtmi, ancestor)
    }

    /// Whether the model derives from the capability interface
    pub fn is_capability(&self, dtmi: &Dtmi) -> bool {
        self.is_child_of(dtmi.as_str(), CAPABILITY_MODEL_ID)
    }

    /// Properties declared by the model or inherited, own declarations first
    pub fn declared_properties(&self, dtmi: &str) -> Vec<String> {
        self.collect_contents(dtmi, |interface| &interface.properties)
    }

    /// Components declared by the model or inherited, own declarations first
    pub fn declared_components(&self, dtmi: &str) -> Vec<String> {
        self.collect_contents(dtmi, |interface| &interface.components)
    }

    pub fn declared_relationships(&self, dtmi: &str) -> Vec<String> {
        self.collect_contents(dtmi, |interface| &interface.relationships)
    }

    fn collect_contents<F>(&self, dtmi: &str, select: F) -> Vec<String>
    where
        F: Fn(&ModelInterface) -> &Vec<String>,
    {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        let chain = std::iter::once(dtmi.to_string()).chain(self.ancestors(dtmi));
        for id in chain {
            if let Some(interface) = self.interfaces.get(&id) {
                for name in select(interface) {
                    if seen.insert(name.clone()) {
                        names.push(name.clone());
                    }
                }
            }
        }
        names
    }
}

fn parse_interface(value: &Value) -> ModelResult<ModelInterface> {
    let object = value
        .as_object()
        .ok_or_else(|| ModelError::Shape("interface is not an object".to_string()))?;

    let id = object
        .get("@id")
        .and_then(Value::as_str)
        .ok_or_else(|| ModelError::Shape("interface has no @id".to_string()))?;
    Dtmi::parse(id)?;

    let extends = match object.get("extends") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(parent)) => vec![parent.clone()],
        Some(Value::Array(parents)) => parents
            .iter()
            .filter_map(|p| match p {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("@id").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        Some(other) => {
            return Err(ModelError::Shape(format!("invalid extends on {id}: {other}")));
        }
    };

    let mut interface = ModelInterface {
        id: id.to_string(),
        extends,
        ..Default::default()
    };

    let contents = object
        .get("contents")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for content in contents {
        let Some(name) = content.get("name").and_then(Value::as_str) else {
            continue;
        };
        let kinds: Vec<&str> = match content.get("@type") {
            Some(Value::String(kind)) => vec![kind.as_str()],
            Some(Value::Array(kinds)) => kinds.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };

        if kinds.contains(&"Property") {
            interface.properties.push(name.to_string());
        } else if kinds.contains(&"Component") {
            interface.components.push(name.to_string());
        } else if kinds.contains(&"Relationship") {
            interface.relationships.push(name.to_string());
        }
    }

    Ok(interface)
}
