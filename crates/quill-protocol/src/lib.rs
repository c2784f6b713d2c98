//! Canonical protocol types for Quill editor-assistant communication.
//!
//! ```text
//! Editor --[ChatRequest]--> Server --[Conversation]--> Assistant backend
//! Editor <--[StreamResponse frames]-- Server <--[StreamResponse events]--
//! ```
//!
//! - [`context`] and [`request`] describe what the editor sends. Both validate
//!   on construction and on deserialization.
//! - [`messages`] turns a request into the model-facing conversation.
//! - [`events`] is the tagged event union a backend emits.
//! - [`stream`] is the per-stream state machine enforcing event ordering.

pub mod context;
pub mod error;
pub mod events;
pub mod messages;
pub mod request;
pub mod stream;

pub use context::{ActiveFile, ChatContext, Diagnostic, OpenFile, Selection, Severity};
pub use error::{ProtocolError, ValidationError, ValidationResult};
pub use events::{DiffProposal, StreamResponse};
pub use messages::{Conversation, LlmMessage, Role, build_conversation, render_context};
pub use request::ChatRequest;
pub use stream::{StreamMachine, StreamState, TerminalReason};
