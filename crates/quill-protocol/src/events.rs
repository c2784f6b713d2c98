//! Stream event types.
//!
//! A backend answers one [`ChatRequest`](crate::ChatRequest) with a sequence of
//! [`StreamResponse`] events: any number of `token` and `diff` events, then
//! exactly one terminal `error` or `done`.

use serde::{Deserialize, Serialize};

/// A proposed change to one file, expressed as a unified-diff patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffProposal {
    /// Unique within the stream that proposed it.
    pub id: String,
    pub file_path: String,
    pub patch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DiffProposal {
    pub fn new(
        id: impl Into<String>,
        file_path: impl Into<String>,
        patch: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            file_path: file_path.into(),
            patch: patch.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One event in a response stream, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamResponse {
    /// Incremental text.
    Token { content: String },

    /// A proposed file change.
    Diff { diff: DiffProposal },

    /// Terminal failure.
    Error { error: String },

    /// Terminal success.
    ///
    /// `content` and `diffs` are only populated on the single synthesized
    /// response delivered to non-streaming requests.
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        diffs: Vec<DiffProposal>,
    },
}

impl StreamResponse {
    pub fn token(content: impl Into<String>) -> Self {
        Self::Token {
            content: content.into(),
        }
    }

    pub fn diff(diff: DiffProposal) -> Self {
        Self::Diff { diff }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    pub fn done() -> Self {
        Self::Done {
            content: None,
            diffs: Vec::new(),
        }
    }

    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Diff { .. } => "diff",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    /// `error` and `done` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done { .. })
    }
}
