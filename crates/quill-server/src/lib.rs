//! Quill server library.
//!
//! Serves the editor-assistant protocol over HTTP: chat requests are answered
//! by an [`assistant::AssistantBackend`], relayed through the stream state
//! machine, and delivered as SSE frames or a single JSON response. Patch
//! utilities and entity updates sit alongside.

pub mod api;
pub mod assistant;
pub mod config;
pub mod logging;
pub mod relay;
pub mod store;

pub use api::{AppState, create_router};
pub use config::AppConfig;
