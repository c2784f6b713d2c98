//! Assistant backends: the producers of stream events.
//!
//! A backend receives the built [`Conversation`] and the original
//! [`ChatRequest`], and sends [`StreamResponse`] events into an [`EventSink`]
//! until it emits a terminal event, the sink closes, or the stream's
//! [`CancellationToken`] fires.

mod echo;
mod scripted;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use quill_protocol::{ChatRequest, Conversation, StreamResponse};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use echo::EchoBackend;
pub use scripted::ScriptedBackend;

/// Sending half of a stream's event channel.
pub type EventSink = mpsc::Sender<StreamResponse>;

#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Model name this backend answers to.
    fn name(&self) -> &str;

    /// Produce events for one request.
    ///
    /// Returning `Err` ends the stream with an `error` event carrying the
    /// message, unless a terminal event was already sent.
    async fn respond(
        &self,
        conversation: Conversation,
        request: ChatRequest,
        events: EventSink,
        cancel: CancellationToken,
    ) -> anyhow::Result<()>;
}

/// Send `event` unless the stream is cancelled first.
///
/// Returns `false` when the stream is gone (cancelled or receiver dropped)
/// and the backend should stop.
pub async fn emit(events: &EventSink, cancel: &CancellationToken, event: StreamResponse) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = events.send(event) => sent.is_ok(),
    }
}

/// Model name to backend, with a fallback for requests that name none.
#[derive(Clone)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn AssistantBackend>>,
    default_model: String,
}

impl BackendRegistry {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            backends: BTreeMap::new(),
            default_model: default_model.into(),
        }
    }

    pub fn register(&mut self, backend: Arc<dyn AssistantBackend>) -> &mut Self {
        self.backends.insert(backend.name().to_string(), backend);
        self
    }

    pub fn with(mut self, backend: impl AssistantBackend + 'static) -> Self {
        self.register(Arc::new(backend));
        self
    }

    /// Backend for `model`, or the default when `model` is `None`.
    pub fn resolve(&self, model: Option<&str>) -> Option<Arc<dyn AssistantBackend>> {
        let name = model.unwrap_or(&self.default_model);
        self.backends.get(name).cloned()
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("models", &self.backends.keys().collect::<Vec<_>>())
            .field("default_model", &self.default_model)
            .finish()
    }
}
