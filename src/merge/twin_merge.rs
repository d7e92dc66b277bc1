//! Patch generation for twins and relationships
//!
//! Produces the minimal operation list that converges an existing object to a
//! newly derived one, restricted to the keys the new object carries:
//!
//! - a model change is a single `replace /$metadata/$model` and nothing else
//! - arrays are never diffed element-wise; a changed array is `remove` + `add`
//! - nested objects are diffed per field
//! - a key missing from the new object is left alone; a key set to null is removed
//! - relationship properties are additive and never removed
//!
//! Numbers compare by value, so `4` and `4.0` are equal, and integral floats
//! are emitted as integers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use super::patch::{escape_pointer_segment, PatchDocument, PatchOperation, PatchResult};
use crate::value_objects::{Relationship, Twin};

/// Something the twin store can patch
pub trait Patchable: Serialize + DeserializeOwned {
    /// Operations converging `self` to `new`
    fn diff(&self, new: &Self) -> PatchDocument;

    /// Apply a patch through the object's wire representation
    fn apply_patch(&mut self, patch: &PatchDocument) -> PatchResult<()> {
        let mut document = serde_json::to_value(&*self)?;
        patch.apply(&mut document)?;
        *self = serde_json::from_value(document)?;
        Ok(())
    }
}

/// Diff `existing` against `new`; the flag is false when nothing changed
pub fn try_create_patch_document<T: Patchable>(existing: &T, new: &T) -> (bool, PatchDocument) {
    let patch = existing.diff(new);
    (!patch.is_empty(), patch)
}

impl Patchable for Twin {
    fn diff(&self, new: &Self) -> PatchDocument {
        let mut patch = PatchDocument::new();

        if !new.metadata.model_id.is_empty() && self.metadata.model_id != new.metadata.model_id {
            patch.push(PatchOperation::replace(
                "/$metadata/$model",
                Value::String(new.metadata.model_id.clone()),
            ));
            return patch;
        }

        for (key, new_value) in &new.contents {
            let path = format!("/{}", escape_pointer_segment(key));
            match self.contents.get(key) {
                None => {
                    if !new_value.is_null() {
                        patch.push(PatchOperation::add(path, normalize_numbers(new_value)));
                    }
                }
                Some(existing_value) => diff_value(&path, existing_value, new_value, &mut patch),
            }
        }

        patch
    }
}

impl Patchable for Relationship {
    fn diff(&self, new: &Self) -> PatchDocument {
        let mut patch = PatchDocument::new();

        for (key, new_value) in &new.properties {
            let path = format!("/{}", escape_pointer_segment(key));
            match self.properties.get(key) {
                None => {
                    if !new_value.is_null() {
                        patch.push(PatchOperation::add(path, normalize_numbers(new_value)));
                    }
                }
                Some(existing_value) => {
                    if !new_value.is_null() && !values_equal(existing_value, new_value) {
                        patch.push(PatchOperation::replace(path, normalize_numbers(new_value)));
                    }
                }
            }
        }

        patch
    }
}

fn diff_value(path: &str, existing: &Value, new: &Value, patch: &mut PatchDocument) {
    match (existing, new) {
        (Value::Null, Value::Null) => {}
        (_, Value::Null) => patch.push(PatchOperation::remove(path)),
        (Value::Array(_), _) | (_, Value::Array(_)) => {
            if !values_equal(existing, new) {
                patch.push(PatchOperation::remove(path));
                patch.push(PatchOperation::add(path, normalize_numbers(new)));
            }
        }
        (Value::Object(existing_fields), Value::Object(new_fields)) => {
            diff_object(path, existing_fields, new_fields, patch);
        }
        _ => {
            if !values_equal(existing, new) {
                patch.push(PatchOperation::replace(path, normalize_numbers(new)));
            }
        }
    }
}

fn diff_object(
    path: &str,
    existing: &Map<String, Value>,
    new: &Map<String, Value>,
    patch: &mut PatchDocument,
) {
    for (field, new_value) in new {
        let field_path = format!("{path}/{}", escape_pointer_segment(field));
        match existing.get(field) {
            None => {
                if !new_value.is_null() {
                    patch.push(PatchOperation::add(field_path, normalize_numbers(new_value)));
                }
            }
            Some(existing_value) => diff_value(&field_path, existing_value, new_value, patch),
        }
    }
}

/// Structural equality with numbers compared by value
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Rewrite integral floats as integers, recursively
pub fn normalize_numbers(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                Value::Number(Number::from(f as i64))
            }
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(normalize_numbers).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), normalize_numbers(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}
