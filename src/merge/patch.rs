//! JSON Patch documents
//!
//! The subset of RFC 6902 the twin store accepts: `add`, `remove` and
//! `replace`, addressed by RFC 6901 JSON pointers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised when a patch does not fit the document it is applied to
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Invalid JSON pointer: {0}")]
    InvalidPointer(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Parent of {0} is not an object or array")]
    NotAContainer(String),

    #[error("Invalid array index in {0}")]
    InvalidIndex(String),

    #[error("Operation on {0} requires a value")]
    MissingValue(String),

    #[error("Document conversion failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type PatchResult<T> = Result<T, PatchError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

/// One patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
        }
    }
}

/// An ordered list of patch operations
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchDocument {
    pub operations: Vec<PatchOperation>,
}

impl PatchDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: PatchOperation) {
        self.operations.push(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Split into the operations whose path is in `paths` and the rest
    pub fn partition_by_paths<S: AsRef<str>>(self, paths: &[S]) -> (PatchDocument, PatchDocument) {
        let (matched, rest): (Vec<_>, Vec<_>) = self
            .operations
            .into_iter()
            .partition(|operation| paths.iter().any(|p| p.as_ref() == operation.path));
        (
            PatchDocument {
                operations: matched,
            },
            PatchDocument { operations: rest },
        )
    }

    /// Apply every operation in order; stops at the first that does not fit
    pub fn apply(&self, document: &mut Value) -> PatchResult<()> {
        for operation in &self.operations {
            apply_operation(document, operation)?;
        }
        Ok(())
    }
}

impl FromIterator<PatchOperation> for PatchDocument {
    fn from_iter<I: IntoIterator<Item = PatchOperation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

/// Escape a key for use as a pointer segment
pub fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape_pointer_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

fn split_pointer(path: &str) -> PatchResult<(Vec<String>, String)> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| PatchError::InvalidPointer(path.to_string()))?;
    let mut segments: Vec<String> = rest.split('/').map(unescape_pointer_segment).collect();
    let last = segments
        .pop()
        .ok_or_else(|| PatchError::InvalidPointer(path.to_string()))?;
    Ok((segments, last))
}

fn parent_mut<'a>(document: &'a mut Value, parents: &[String], path: &str) -> PatchResult<&'a mut Value> {
    let mut current = document;
    for segment in parents {
        current = match current {
            Value::Object(map) => map
                .get_mut(segment)
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?,
            Value::Array(items) => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| PatchError::InvalidIndex(path.to_string()))?;
                items
                    .get_mut(index)
                    .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?
            }
            _ => return Err(PatchError::NotAContainer(path.to_string())),
        };
    }
    Ok(current)
}

fn apply_operation(document: &mut Value, operation: &PatchOperation) -> PatchResult<()> {
    let path = operation.path.as_str();
    let (parents, last) = split_pointer(path)?;
    let parent = parent_mut(document, &parents, path)?;

    let value = || {
        operation
            .value
            .clone()
            .ok_or_else(|| PatchError::MissingValue(path.to_string()))
    };

    match (operation.op, parent) {
        (PatchOp::Add, Value::Object(map)) => {
            map.insert(last, value()?);
        }
        (PatchOp::Add, Value::Array(items)) => {
            if last == "-" {
                items.push(value()?);
            } else {
                let index: usize = last
                    .parse()
                    .map_err(|_| PatchError::InvalidIndex(path.to_string()))?;
                if index > items.len() {
                    return Err(PatchError::InvalidIndex(path.to_string()));
                }
                items.insert(index, value()?);
            }
        }
        (PatchOp::Remove, Value::Object(map)) => {
            map.shift_remove(&last)
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
        }
        (PatchOp::Remove, Value::Array(items)) => {
            let index = array_index(&last, items.len(), path)?;
            items.remove(index);
        }
        (PatchOp::Replace, Value::Object(map)) => {
            let slot = map
                .get_mut(&last)
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
            *slot = value()?;
        }
        (PatchOp::Replace, Value::Array(items)) => {
            let index = array_index(&last, items.len(), path)?;
            items[index] = value()?;
        }
        _ => return Err(PatchError::NotAContainer(path.to_string())),
    }
    Ok(())
}

fn array_index(segment: &str, len: usize, path: &str) -> PatchResult<usize> {
    let index: usize = segment
        .parse()
        .map_err(|_| PatchError::InvalidIndex(path.to_string()))?;
    if index >= len {
        return Err(PatchError::PathNotFound(path.to_string()));
    }
    Ok(index)
}
