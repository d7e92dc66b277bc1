//! Ontology mapping document
//!
//! The document is authored as JSON with PascalCase keys. Every rule list is
//! optional and defaults to empty.

use serde::{Deserialize, Serialize};

/// Name and version of an ontology referenced by a mapping
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OntologyReference {
    #[serde(default)]
    pub dtdl_version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MappingHeader {
    #[serde(default)]
    pub input_ontologies: Vec<OntologyReference>,
    #[serde(default)]
    pub output_ontologies: Vec<OntologyReference>,
}

/// Input interface to output interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceRemap {
    pub input_dtmi: String,
    pub output_dtmi: String,
}

/// Input relationship name to output relationship name, optionally reversed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelationshipRemap {
    pub input_relationship: String,
    pub output_relationship: String,
    #[serde(default)]
    pub reverse_relationship_direction: bool,
}

/// Fill an output property from the first non-empty candidate input property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FillProperty {
    pub input_property_names: Vec<String>,
    pub output_dtmi_filter: String,
    pub output_property_name: String,
}

/// Copy input properties to an output property, or into a collection-valued one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PropertyProjection {
    pub input_property_names: Vec<String>,
    pub output_dtmi_filter: String,
    pub output_property_name: String,
    #[serde(default)]
    pub is_output_property_collection: bool,
}

/// Flatten a field of an object-valued input property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectTransformation {
    pub input_property: String,
    pub input_property_name: String,
    pub output_property_name: String,
    #[serde(default)]
    pub priority: i32,
    pub output_dtmi_filter: String,
}

/// The declarative mapping from the source ontology to the target ontology
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OntologyMapping {
    #[serde(default)]
    pub header: MappingHeader,
    #[serde(default)]
    pub interface_remaps: Vec<InterfaceRemap>,
    #[serde(default)]
    pub relationship_remaps: Vec<RelationshipRemap>,
    #[serde(default)]
    pub fill_properties: Vec<FillProperty>,
    #[serde(default)]
    pub property_projections: Vec<PropertyProjection>,
    #[serde(default)]
    pub object_transformations: Vec<ObjectTransformation>,
}

impl OntologyMapping {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
