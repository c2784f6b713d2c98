//! Pumps backend events through a [`StreamMachine`] toward the transport.
//!
//! The relay owns the machine and is its only writer. It closes the stream
//! with a synthesized `error` when the backend stalls, runs too long, stops
//! without a terminal event, or reuses a diff id. Dropping an open relay
//! (the client went away) cancels the stream and tells the backend to stop.

use std::sync::Arc;
use std::time::Duration;

use quill_protocol::{ChatRequest, Conversation, ProtocolError, StreamMachine, StreamResponse};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assistant::AssistantBackend;
use crate::config::StreamConfig;

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub idle: Duration,
    pub total: Duration,
}

impl From<&StreamConfig> for Timeouts {
    fn from(config: &StreamConfig) -> Self {
        Self {
            idle: config.idle_timeout(),
            total: config.max_duration(),
        }
    }
}

pub struct Relay {
    id: Uuid,
    machine: StreamMachine,
    events: mpsc::Receiver<StreamResponse>,
    cancel: CancellationToken,
    timeouts: Timeouts,
    deadline: Instant,
}

/// Spawn `backend` for one request and return the relay reading from it.
pub fn start(
    backend: Arc<dyn AssistantBackend>,
    conversation: Conversation,
    request: ChatRequest,
    config: &StreamConfig,
) -> Relay {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let relay = Relay::new(rx, Timeouts::from(config));
    let cancel = relay.cancellation();
    let stream_id = relay.id();

    info!(
        stream_id = %stream_id,
        backend = backend.name(),
        streaming = request.is_streaming(),
        "starting stream"
    );

    tokio::spawn(async move {
        let errors = tx.clone();
        if let Err(err) = backend.respond(conversation, request, tx, cancel).await {
            warn!(stream_id = %stream_id, backend = backend.name(), error = %err, "assistant backend failed");
            // Ignored if the relay already closed the stream.
            let _ = errors.send(StreamResponse::error(err.to_string())).await;
        }
    });

    relay
}

impl Relay {
    pub fn new(events: mpsc::Receiver<StreamResponse>, timeouts: Timeouts) -> Self {
        Self {
            id: Uuid::new_v4(),
            machine: StreamMachine::new(),
            events,
            cancel: CancellationToken::new(),
            timeouts,
            deadline: Instant::now() + timeouts.total,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Token the producer should watch; fired whenever the stream closes early.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn machine(&self) -> &StreamMachine {
        &self.machine
    }

    /// Next event to deliver, or `None` once the terminal event has been
    /// delivered.
    pub async fn next(&mut self) -> Option<StreamResponse> {
        if self.machine.is_closed() {
            return None;
        }

        loop {
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.close_with(self.total_timeout_message());
            }
            let wait = self.timeouts.idle.min(remaining);

            let received = match tokio::time::timeout(wait, self.events.recv()).await {
                Ok(received) => received,
                Err(_) if wait < self.timeouts.idle => {
                    return self.close_with(self.total_timeout_message());
                }
                Err(_) => {
                    let message = format!(
                        "timed out after {:?} without a response from the assistant",
                        self.timeouts.idle
                    );
                    return self.close_with(message);
                }
            };

            let Some(event) = received else {
                return self.close_with(ProtocolError::MissingTerminal.to_string());
            };

            match self.machine.accept(event) {
                Ok(accepted) => {
                    let accepted = accepted.clone();
                    if accepted.is_terminal() {
                        debug!(stream_id = %self.id, kind = accepted.kind(), "stream finished");
                        self.shut_down();
                    }
                    return Some(accepted);
                }
                Err(err @ ProtocolError::DuplicateDiffId(_)) => {
                    return self.close_with(err.to_string());
                }
                // Not reachable while open; skip rather than deliver.
                Err(err) => {
                    warn!(stream_id = %self.id, error = %err, "dropping event");
                    continue;
                }
            }
        }
    }

    /// Drive the stream to its end and hand back the closed machine.
    pub async fn finish(mut self) -> StreamMachine {
        while self.next().await.is_some() {}
        std::mem::take(&mut self.machine)
    }

    /// Abandon the stream on behalf of the client.
    pub fn cancel(&mut self) {
        if self.machine.cancel() {
            info!(stream_id = %self.id, "stream cancelled by client");
            self.shut_down();
        }
    }

    fn close_with(&mut self, message: String) -> Option<StreamResponse> {
        warn!(stream_id = %self.id, reason = %message, "closing stream with error");
        let event = self.machine.fail(message);
        self.shut_down();
        event
    }

    fn total_timeout_message(&self) -> String {
        format!(
            "timed out: stream exceeded the maximum duration of {:?}",
            self.timeouts.total
        )
    }

    /// Stop the producer and discard whatever it already queued.
    fn shut_down(&mut self) {
        self.cancel.cancel();
        self.events.close();
        while let Ok(late) = self.events.try_recv() {
            // The machine is closed, so this only logs and rejects.
            let _ = self.machine.accept(late);
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            self.cancel();
        }
    }
}
