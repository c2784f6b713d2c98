//! Protocol error types.

use thiserror::Error;

/// Result type for construction-time validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Malformed input data, rejected before any protocol processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The prompt is empty or whitespace only.
    #[error("prompt must not be empty")]
    EmptyPrompt,

    /// A selection bound is negative.
    #[error("selection bounds must not be negative (start {start}, end {end})")]
    NegativeSelection { start: i64, end: i64 },

    /// Selection start lies after its end.
    #[error("selection start {start} is after end {end}")]
    InvertedSelection { start: i64, end: i64 },

    /// Selection end lies past the end of the file content.
    #[error("selection end {end} exceeds content length {len}")]
    SelectionOutOfBounds { end: usize, len: usize },

    /// Selected text differs from the content at the selected range.
    #[error("selection text does not match content[{start}..{end}]")]
    SelectionMismatch { start: usize, end: usize },

    /// Diagnostic severity outside of error/warning/info/hint.
    #[error("unknown diagnostic severity `{0}`")]
    UnknownSeverity(String),

    /// Diagnostic line numbers start at 1.
    #[error("diagnostic line must be 1-based, got {0}")]
    InvalidLine(u32),

    /// Message role outside of system/user/assistant.
    #[error("unknown message role `{0}`")]
    UnknownRole(String),

    /// A system message anywhere but the first position.
    #[error("system message must be the single leading message (found at position {0})")]
    MisplacedSystemMessage(usize),

    /// Body could not be decoded into the expected shape.
    #[error("malformed request: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::Malformed(err.to_string())
    }
}

/// Ordering or uniqueness violation within a single stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// An event arrived after the stream emitted its terminal event.
    #[error("event after terminal: `{event}` arrived after the stream closed")]
    EventAfterTerminal { event: &'static str },

    /// A diff reused an id already proposed in this stream.
    #[error("duplicate diff id `{0}` in stream")]
    DuplicateDiffId(String),

    /// The producer stopped without emitting `error` or `done`.
    #[error("stream ended without a terminal event")]
    MissingTerminal,
}
