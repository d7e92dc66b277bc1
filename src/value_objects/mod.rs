//! Ingestion value objects
//!
//! Value objects are the plain data exchanged between the ingestion pipeline,
//! the merge engine and the output store. They are compared by value and
//! serialize to the wire shape the digital twin store expects.

mod dtmi;
mod mapped_entry;
mod relationship;
mod sync_errors;
mod twin;

pub use dtmi::{Dtmi, DtmiError};
pub use mapped_entry::{MappedEntry, MappedEntryRecord, MappedEntryStatus};
pub use relationship::Relationship;
pub use sync_errors::SyncErrors;
pub use twin::{Twin, TwinContents, TwinMetadata};

use serde_json::Value;

/// Text of a JSON value; strings without quotes
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
