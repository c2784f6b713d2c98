use std::time::Duration;

use async_trait::async_trait;
use quill_protocol::{ChatRequest, Conversation, StreamResponse};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{AssistantBackend, EventSink, emit};

/// Streams the user's prompt back one word per `token` event, then `done`.
#[derive(Debug, Clone, Default)]
pub struct EchoBackend {
    delay: Duration,
}

impl EchoBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl AssistantBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn respond(
        &self,
        conversation: Conversation,
        request: ChatRequest,
        events: EventSink,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let text = conversation
            .last_user_message()
            .map(|message| message.content.as_str())
            .unwrap_or_else(|| request.prompt());

        for (idx, word) in text.split_whitespace().enumerate() {
            if !self.delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
            let content = if idx == 0 {
                word.to_string()
            } else {
                format!(" {word}")
            };
            if !emit(&events, &cancel, StreamResponse::token(content)).await {
                debug!("echo stream abandoned");
                return Ok(());
            }
        }

        emit(&events, &cancel, StreamResponse::done()).await;
        Ok(())
    }
}
