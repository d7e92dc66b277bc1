//! Twin merge engine
//!
//! Diffs an existing twin or relationship against a freshly derived one and
//! expresses the difference as a JSON Patch document.

mod patch;
mod twin_merge;

pub use patch::{
    escape_pointer_segment, PatchDocument, PatchError, PatchOp, PatchOperation, PatchResult,
};
pub use twin_merge::{normalize_numbers, try_create_patch_document, values_equal, Patchable};
