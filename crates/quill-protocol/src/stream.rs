//! Per-stream protocol state machine.
//!
//! [`StreamMachine`] owns everything one stream accumulates: its state, the
//! ordered log of accepted events, the concatenated token text and the
//! proposed diffs. It never blocks; the transport feeds it one event at a time
//! and forwards only what it accepts.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::events::{DiffProposal, StreamResponse};

/// Why a stream closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReason {
    /// A `done` event was emitted.
    Done,
    /// An `error` event was emitted.
    Error(String),
    /// The client abandoned the stream. No terminal event was delivered.
    Cancelled,
}

/// Lifecycle state of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Closed(TerminalReason),
}

/// Explicit finite-state object for one response stream.
#[derive(Debug, Clone)]
pub struct StreamMachine {
    state: StreamState,
    log: Vec<StreamResponse>,
    text: String,
    diffs: Vec<DiffProposal>,
    diff_ids: HashSet<String>,
}

impl Default for StreamMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamMachine {
    pub fn new() -> Self {
        Self {
            state: StreamState::Open,
            log: Vec::new(),
            text: String::new(),
            diffs: Vec::new(),
            diff_ids: HashSet::new(),
        }
    }

    /// Rebuild a machine from a recorded event sequence.
    ///
    /// Fails on the first event the protocol would have rejected.
    pub fn replay<I>(events: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = StreamResponse>,
    {
        let mut machine = Self::new();
        for event in events {
            machine.accept(event)?;
        }
        Ok(machine)
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == StreamState::Open
    }

    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Accept the next event, returning it for delivery.
    ///
    /// Events after the terminal event and reused diff ids are rejected and
    /// never enter the log. A rejected diff leaves the stream open; closing it
    /// is up to the caller (see [`StreamMachine::fail`]).
    ///
    /// A `done` is always logged bare. Content and diffs only count when they
    /// arrive as `token` and `diff` events; [`StreamMachine::summary`] carries
    /// the accumulated result.
    pub fn accept(&mut self, event: StreamResponse) -> Result<&StreamResponse, ProtocolError> {
        if self.is_closed() {
            warn!(event = event.kind(), "discarding event after terminal");
            return Err(ProtocolError::EventAfterTerminal { event: event.kind() });
        }

        let event = match event {
            StreamResponse::Done { content, diffs } if content.is_some() || !diffs.is_empty() => {
                warn!(
                    has_content = content.is_some(),
                    diffs = diffs.len(),
                    "dropping payload carried by done event"
                );
                StreamResponse::done()
            }
            other => other,
        };

        match &event {
            StreamResponse::Token { content } => {
                self.text.push_str(content);
            }
            StreamResponse::Diff { diff } => {
                if !self.diff_ids.insert(diff.id.clone()) {
                    warn!(diff_id = %diff.id, "rejecting duplicate diff id");
                    return Err(ProtocolError::DuplicateDiffId(diff.id.clone()));
                }
                self.diffs.push(diff.clone());
            }
            StreamResponse::Error { error } => {
                debug!(error = %error, "stream closed with error");
                self.state = StreamState::Closed(TerminalReason::Error(error.clone()));
            }
            StreamResponse::Done { .. } => {
                debug!(
                    tokens = self.text.len(),
                    diffs = self.diffs.len(),
                    "stream closed"
                );
                self.state = StreamState::Closed(TerminalReason::Done);
            }
        }

        self.log.push(event);
        Ok(&self.log[self.log.len() - 1])
    }

    /// Close an open stream with a synthesized `error` event.
    ///
    /// Returns the event to deliver, or `None` if the stream was already closed.
    pub fn fail(&mut self, message: impl Into<String>) -> Option<StreamResponse> {
        if self.is_closed() {
            return None;
        }
        self.accept(StreamResponse::error(message)).ok().cloned()
    }

    /// Abandon an open stream. Returns `false` if it was already closed.
    pub fn cancel(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        debug!("stream cancelled by client");
        self.state = StreamState::Closed(TerminalReason::Cancelled);
        true
    }

    /// Accepted events, in order.
    pub fn log(&self) -> &[StreamResponse] {
        &self.log
    }

    /// Concatenated `token` content, in arrival order.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Proposed diffs, in arrival order.
    pub fn diffs(&self) -> &[DiffProposal] {
        &self.diffs
    }

    pub fn has_diff(&self, id: &str) -> bool {
        self.diff_ids.contains(id)
    }

    /// The single response delivered to a non-streaming request.
    ///
    /// `None` while the stream is still open.
    pub fn summary(&self) -> Option<StreamResponse> {
        match &self.state {
            StreamState::Open => None,
            StreamState::Closed(TerminalReason::Done) => Some(StreamResponse::Done {
                content: Some(self.text.clone()),
                diffs: self.diffs.clone(),
            }),
            StreamState::Closed(TerminalReason::Error(error)) => {
                Some(StreamResponse::error(error.clone()))
            }
            StreamState::Closed(TerminalReason::Cancelled) => {
                Some(StreamResponse::error("stream cancelled"))
            }
        }
    }
}
