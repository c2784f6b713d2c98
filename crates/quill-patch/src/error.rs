//! Patch and diff-lifecycle error types.

use thiserror::Error;

/// Errors raised while parsing or applying a unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The patch text is not a well-formed unified diff.
    #[error("malformed patch at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// A context or removed line does not match the current content.
    #[error(
        "patch conflict in hunk {hunk} at line {line}: expected {expected:?}, found {}",
        found.as_deref().map(|f| format!("{f:?}")).unwrap_or_else(|| "end of file".to_string())
    )]
    Conflict {
        hunk: usize,
        line: usize,
        expected: String,
        found: Option<String>,
    },
}

impl PatchError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors raised by [`DiffStore`](crate::DiffStore) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffStoreError {
    /// No proposed diff with this id is held.
    #[error("diff not found: {0}")]
    NotFound(String),

    /// A diff with this id was already proposed in this stream.
    #[error("diff already proposed: {0}")]
    Duplicate(String),

    #[error(transparent)]
    Patch(#[from] PatchError),
}
