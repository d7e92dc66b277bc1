//! Ontology mapping manager
//!
//! Loads the mapping document once, compiles it, and answers the lookups the
//! ingestion pipeline needs. The compiled mapping is immutable and shared as
//! an `Arc`, so every phase of a sync reads the same rules.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::errors::{OntologyError, OntologyResult};
use super::loader::OntologyMappingLoader;
use super::mapping::OntologyMapping;
use super::rules::RuleTable;
use super::target_model::TargetModelSet;

/// A mapping document compiled into lookup tables
#[derive(Debug, Clone)]
pub struct LoadedOntologyMapping {
    mapping: OntologyMapping,
    interface_remaps: HashMap<String, String>,
    relationship_remaps: HashMap<String, (String, bool)>,
    rules: RuleTable,
}

impl LoadedOntologyMapping {
    /// Index the remaps and compile the property rules
    pub fn compile(mapping: OntologyMapping) -> OntologyResult<Self> {
        let mut interface_remaps = HashMap::new();
        for remap in &mapping.interface_remaps {
            interface_remaps
                .entry(remap.input_dtmi.clone())
                .or_insert_with(|| remap.output_dtmi.clone());
        }

        let mut relationship_remaps = HashMap::new();
        for remap in &mapping.relationship_remaps {
            relationship_remaps
                .entry(remap.input_relationship.clone())
                .or_insert_with(|| {
                    (
                        remap.output_relationship.clone(),
                        remap.reverse_relationship_direction,
                    )
                });
        }

        let rules = RuleTable::compile(&mapping)?;

        Ok(Self {
            mapping,
            interface_remaps,
            relationship_remaps,
            rules,
        })
    }

    pub fn mapping(&self) -> &OntologyMapping {
        &self.mapping
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Exact interface remap for an input DTMI
    pub fn try_get_interface_remap(&self, input_dtmi: &str) -> Option<&str> {
        self.interface_remaps.get(input_dtmi).map(String::as_str)
    }

    /// Output DTMI for an input DTMI
    ///
    /// An input DTMI that already belongs to the target ontology is returned
    /// unchanged, even when a remap exists for it. `None` means the entity
    /// type has no representation in the target ontology.
    pub fn try_get_output_interface_dtmi(
        &self,
        input_dtmi: &str,
        targets: &TargetModelSet,
    ) -> Option<String> {
        if targets.contains(input_dtmi) {
            return Some(input_dtmi.to_string());
        }
        self.try_get_interface_remap(input_dtmi).map(str::to_string)
    }

    /// Output relationship name and whether its direction is reversed
    pub fn get_output_relationship_type(&self, input_relationship: &str) -> (String, bool) {
        match self.relationship_remaps.get(input_relationship) {
            Some((name, reversed)) => (name.clone(), *reversed),
            None => (input_relationship.to_string(), false),
        }
    }

    /// Interface remap targets missing from the target model set
    pub fn validate_target_mapping(&self, targets: &TargetModelSet) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for remap in &self.mapping.interface_remaps {
            if !targets.contains(&remap.output_dtmi) && !missing.contains(&remap.output_dtmi) {
                missing.push(remap.output_dtmi.clone());
            }
        }
        missing
    }
}

/// Loads and caches the ontology mapping for the lifetime of the process
pub struct OntologyMappingManager {
    loader: Arc<dyn OntologyMappingLoader>,
    compiled: OnceCell<Arc<LoadedOntologyMapping>>,
}

impl OntologyMappingManager {
    pub fn new(loader: Arc<dyn OntologyMappingLoader>) -> Self {
        Self {
            loader,
            compiled: OnceCell::new(),
        }
    }

    /// Load and compile the mapping; later calls return the cached result
    ///
    /// A failed load is not cached, so the next sync retries it.
    pub async fn load(&self) -> OntologyResult<Arc<LoadedOntologyMapping>> {
        let compiled = self
            .compiled
            .get_or_try_init(|| async {
                let mapping = self.loader.load_ontology_mapping().await?;
                let compiled = LoadedOntologyMapping::compile(mapping)?;
                info!(
                    interface_remaps = compiled.mapping().interface_remaps.len(),
                    relationship_remaps = compiled.mapping().relationship_remaps.len(),
                    property_rules = compiled.rules().len(),
                    "Loaded ontology mapping"
                );
                Ok::<_, OntologyError>(Arc::new(compiled))
            })
            .await?;
        Ok(Arc::clone(compiled))
    }

    /// The compiled mapping, if [`load`](Self::load) has succeeded
    pub fn loaded(&self) -> OntologyResult<Arc<LoadedOntologyMapping>> {
        self.compiled.get().cloned().ok_or(OntologyError::NotLoaded)
    }

    pub fn try_get_output_interface_dtmi(
        &self,
        input_dtmi: &str,
        targets: &TargetModelSet,
    ) -> OntologyResult<Option<String>> {
        let output = self.loaded()?.try_get_output_interface_dtmi(input_dtmi, targets);
        if output.is_none() {
            debug!(input_dtmi, "No output interface for input DTMI");
        }
        Ok(output)
    }

    pub fn get_output_relationship_type(&self, input_relationship: &str) -> OntologyResult<(String, bool)> {
        Ok(self.loaded()?.get_output_relationship_type(input_relationship))
    }

    pub fn validate_target_mapping(&self, targets: &TargetModelSet) -> OntologyResult<Vec<String>> {
        Ok(self.loaded()?.validate_target_mapping(targets))
    }
}
