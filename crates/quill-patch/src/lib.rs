//! Patch handling for proposed diffs.
//!
//! [`Patch`] parses and strictly applies unified diffs; [`DiffStore`] holds the
//! diffs one stream proposed until the editor applies or discards them.

pub mod error;
pub mod patch;
pub mod store;

pub use error::{DiffStoreError, PatchError};
pub use patch::{Hunk, HunkLine, Patch, create_patch};
pub use store::{AppliedDiff, DiffStatus, DiffStore};

/// Parse `patch` and apply it to `content` in one step.
pub fn apply_patch(patch: &str, content: &str) -> Result<String, PatchError> {
    Patch::parse(patch)?.apply(content)
}
