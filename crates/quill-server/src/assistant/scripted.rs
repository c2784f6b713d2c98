use std::time::Duration;

use async_trait::async_trait;
use quill_protocol::{ChatRequest, Conversation, StreamResponse};
use tokio_util::sync::CancellationToken;

use super::{AssistantBackend, EventSink};

/// Replays a fixed list of events regardless of the request.
///
/// Nothing is checked: a script may omit the terminal event, repeat a diff id,
/// or keep going after `done`. The relay is responsible for the fallout.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    name: String,
    events: Vec<StreamResponse>,
    delay: Duration,
    hang: bool,
}

impl ScriptedBackend {
    pub fn new(name: impl Into<String>, events: Vec<StreamResponse>) -> Self {
        Self {
            name: name.into(),
            events,
            delay: Duration::ZERO,
            hang: false,
        }
    }

    /// Wait `delay` before each event.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// After the script, keep the channel open until cancelled.
    pub fn then_hang(mut self) -> Self {
        self.hang = true;
        self
    }
}

#[async_trait]
impl AssistantBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn respond(
        &self,
        _conversation: Conversation,
        _request: ChatRequest,
        events: EventSink,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        for event in &self.events {
            if !self.delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
            // Keep sending after a terminal event; the relay discards the rest.
            if events.send(event.clone()).await.is_err() {
                return Ok(());
            }
        }

        if self.hang {
            cancel.cancelled().await;
        }
        drop(events);
        Ok(())
    }
}
