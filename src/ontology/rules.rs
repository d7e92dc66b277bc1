//! Compiled property rules
//!
//! Fill properties, property projections and object transformations are
//! compiled once into a flat, ordered table of [`PropertyRule`] records. The
//! table is walked by one generic loop: rules are grouped by category (fill,
//! then projection, then object transformation) and object transformations
//! are sorted by ascending priority, then declaration order. A later rule may
//! overwrite a property written by an earlier one.

use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;

use super::errors::{OntologyError, OntologyResult};
use super::mapping::OntologyMapping;
use crate::value_objects::{value_text, TwinContents};

/// A compiled `OutputDtmiFilter`, matched anywhere in the DTMI
#[derive(Clone)]
pub struct DtmiFilter {
    regex: Regex,
}

impl DtmiFilter {
    pub fn compile(pattern: &str) -> OntologyResult<Self> {
        let regex = Regex::new(pattern).map_err(|source| OntologyError::InvalidFilter {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, dtmi: &str) -> bool {
        self.regex.is_match(dtmi)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl fmt::Debug for DtmiFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DtmiFilter").field(&self.as_str()).finish()
    }
}

/// Rule category, in application order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleKind {
    Fill,
    Projection,
    ObjectTransformation,
}

/// One declarative property rule
#[derive(Debug, Clone)]
pub enum PropertyRule {
    Fill {
        input_property_names: Vec<String>,
        output_property_name: String,
        filter: DtmiFilter,
    },
    Projection {
        input_property_names: Vec<String>,
        output_property_name: String,
        is_collection: bool,
        filter: DtmiFilter,
    },
    ObjectTransformation {
        input_property: String,
        input_property_name: String,
        output_property_name: String,
        priority: i32,
        filter: DtmiFilter,
    },
}

/// What applying a rule did to the contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The output property was written
    Written,
    /// The rule matched but the source had nothing to contribute
    NoValue,
    /// A collection entry was written over an existing entry
    DuplicateCollectionKey(String),
}

impl PropertyRule {
    pub fn kind(&self) -> RuleKind {
        match self {
            Self::Fill { .. } => RuleKind::Fill,
            Self::Projection { .. } => RuleKind::Projection,
            Self::ObjectTransformation { .. } => RuleKind::ObjectTransformation,
        }
    }

    pub fn output_property_name(&self) -> &str {
        match self {
            Self::Fill {
                output_property_name,
                ..
            }
            | Self::Projection {
                output_property_name,
                ..
            }
            | Self::ObjectTransformation {
                output_property_name,
                ..
            } => output_property_name,
        }
    }

    pub fn filter(&self) -> &DtmiFilter {
        match self {
            Self::Fill { filter, .. }
            | Self::Projection { filter, .. }
            | Self::ObjectTransformation { filter, .. } => filter,
        }
    }

    /// Whether the source carries anything this rule reads
    pub fn has_input(&self, source: &Map<String, Value>) -> bool {
        match self {
            Self::Fill {
                input_property_names,
                ..
            }
            | Self::Projection {
                input_property_names,
                ..
            } => input_property_names.iter().any(|name| source.contains_key(name)),
            Self::ObjectTransformation { input_property, .. } => source
                .get(input_property)
                .is_some_and(|value| !value.is_null()),
        }
    }

    /// Apply the rule to `contents`, reading from the raw source entity
    pub fn apply(&self, source: &Map<String, Value>, contents: &mut TwinContents) -> RuleOutcome {
        match self {
            Self::Fill {
                input_property_names,
                output_property_name,
                ..
            } => {
                let candidate = input_property_names
                    .iter()
                    .filter_map(|name| source.get(name))
                    .find(|value| !is_empty_value(value));

                match candidate {
                    Some(value) => {
                        contents.insert(output_property_name.clone(), value.clone());
                        RuleOutcome::Written
                    }
                    None => RuleOutcome::NoValue,
                }
            }

            Self::Projection {
                input_property_names,
                output_property_name,
                is_collection,
                ..
            } => {
                let mut outcome = RuleOutcome::NoValue;
                for name in input_property_names {
                    let Some(value) = source.get(name) else {
                        continue;
                    };
                    // present nulls project as empty text
                    let text = match value {
                        Value::Null => Value::String(String::new()),
                        other => Value::String(value_text(other)),
                    };

                    if *is_collection {
                        let slot = contents
                            .entry(output_property_name.clone())
                            .or_insert_with(|| Value::Object(Map::new()));
                        if !slot.is_object() {
                            *slot = Value::Object(Map::new());
                        }
                        if let Value::Object(collection) = slot {
                            if collection.insert(name.clone(), text).is_some() {
                                outcome = RuleOutcome::DuplicateCollectionKey(name.clone());
                                continue;
                            }
                        }
                    } else {
                        contents.insert(output_property_name.clone(), text);
                    }

                    if outcome == RuleOutcome::NoValue {
                        outcome = RuleOutcome::Written;
                    }
                }
                outcome
            }

            Self::ObjectTransformation {
                input_property,
                input_property_name,
                output_property_name,
                ..
            } => {
                let field = source
                    .get(input_property)
                    .and_then(Value::as_object)
                    .and_then(|object| object.get(input_property_name))
                    .filter(|v| !v.is_null());

                match field {
                    Some(value) => {
                        contents.insert(output_property_name.clone(), Value::String(value_text(value)));
                        RuleOutcome::Written
                    }
                    None => RuleOutcome::NoValue,
                }
            }
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// All property rules of a mapping, compiled and in application order
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<PropertyRule>,
}

impl RuleTable {
    /// Compile every filter of the mapping; the first invalid pattern fails the whole table
    pub fn compile(mapping: &OntologyMapping) -> OntologyResult<Self> {
        let mut rules = Vec::with_capacity(
            mapping.fill_properties.len()
                + mapping.property_projections.len()
                + mapping.object_transformations.len(),
        );

        for fill in &mapping.fill_properties {
            rules.push(PropertyRule::Fill {
                input_property_names: fill.input_property_names.clone(),
                output_property_name: fill.output_property_name.clone(),
                filter: DtmiFilter::compile(&fill.output_dtmi_filter)?,
            });
        }

        for projection in &mapping.property_projections {
            rules.push(PropertyRule::Projection {
                input_property_names: projection.input_property_names.clone(),
                output_property_name: projection.output_property_name.clone(),
                is_collection: projection.is_output_property_collection,
                filter: DtmiFilter::compile(&projection.output_dtmi_filter)?,
            });
        }

        let mut transformations = mapping.object_transformations.iter().collect::<Vec<_>>();
        // stable: equal priorities keep declaration order
        transformations.sort_by_key(|t| t.priority);
        for transformation in transformations {
            rules.push(PropertyRule::ObjectTransformation {
                input_property: transformation.input_property.clone(),
                input_property_name: transformation.input_property_name.clone(),
                output_property_name: transformation.output_property_name.clone(),
                priority: transformation.priority,
                filter: DtmiFilter::compile(&transformation.output_dtmi_filter)?,
            });
        }

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[PropertyRule] {
        &self.rules
    }

    /// Rules writing the given output property, in application order
    pub fn rules_for_property<'a>(
        &'a self,
        property: &'a str,
    ) -> impl Iterator<Item = &'a PropertyRule> + 'a {
        self.rules
            .iter()
            .filter(move |rule| rule.output_property_name() == property)
    }

    /// Object transformations writing `property` for a model, in application order
    ///
    /// A rule applies when its filter matches and the source carries a
    /// non-null `input_property`. The model itself is tried first, then its
    /// ancestors nearest first; every applicable rule of the first DTMI with
    /// any is returned, so later ones overwrite earlier ones.
    pub fn object_transformations_for<'a>(
        &'a self,
        property: &str,
        source: &Map<String, Value>,
        output_dtmi: &str,
        ancestors: &[String],
    ) -> Vec<&'a PropertyRule> {
        let applicable = self.rules.iter().filter(|rule| {
            rule.kind() == RuleKind::ObjectTransformation
                && rule.output_property_name() == property
                && rule.has_input(source)
        });

        std::iter::once(output_dtmi)
            .chain(ancestors.iter().map(String::as_str))
            .map(|dtmi| {
                applicable
                    .clone()
                    .filter(|rule| rule.filter().is_match(dtmi))
                    .collect::<Vec<_>>()
            })
            .find(|rules| !rules.is_empty())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
