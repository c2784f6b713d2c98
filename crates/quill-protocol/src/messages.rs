//! Model-facing conversation messages.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::ChatContext;
use crate::error::{ValidationError, ValidationResult};
use crate::request::ChatRequest;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

/// One turn in a model-facing conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: Role,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered messages with at most one `system` message, in leading position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<LlmMessage>,
}

impl Conversation {
    pub fn new(messages: Vec<LlmMessage>) -> ValidationResult<Self> {
        if let Some(pos) = messages
            .iter()
            .enumerate()
            .skip(1)
            .find_map(|(idx, msg)| (msg.role == Role::System).then_some(idx))
        {
            return Err(ValidationError::MisplacedSystemMessage(pos));
        }
        Ok(Self { messages })
    }

    /// Append a non-system message.
    pub fn push(&mut self, message: LlmMessage) -> ValidationResult<()> {
        if message.role == Role::System && !self.messages.is_empty() {
            return Err(ValidationError::MisplacedSystemMessage(self.messages.len()));
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|msg| msg.role == Role::System)
            .map(|msg| msg.content.as_str())
    }

    pub fn messages(&self) -> &[LlmMessage] {
        &self.messages
    }

    pub fn last_user_message(&self) -> Option<&LlmMessage> {
        self.messages.iter().rev().find(|msg| msg.role == Role::User)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<LlmMessage> {
        self.messages
    }
}

impl<'de> Deserialize<'de> for Conversation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let messages = Vec::<LlmMessage>::deserialize(deserializer)?;
        Conversation::new(messages).map_err(serde::de::Error::custom)
    }
}

/// Build the conversation sent to a model for `request`.
///
/// The editor context is folded into the leading system message; the prompt
/// becomes the single user message.
pub fn build_conversation(system_prompt: &str, request: &ChatRequest) -> Conversation {
    let mut system = system_prompt.trim().to_string();
    let rendered = render_context(request.context());
    if !rendered.is_empty() {
        if !system.is_empty() {
            system.push_str("\n\n");
        }
        system.push_str(&rendered);
    }

    let mut messages = Vec::with_capacity(2);
    if !system.is_empty() {
        messages.push(LlmMessage::system(system));
    }
    messages.push(LlmMessage::user(request.prompt()));
    Conversation { messages }
}

/// Render editor context as plain text for the system message.
pub fn render_context(context: &ChatContext) -> String {
    let mut out = String::new();

    if let Some(file) = &context.active_file {
        let _ = writeln!(out, "Active file: {}", file.path());
        let _ = writeln!(out, "```{}", file.language());
        out.push_str(file.content());
        if !file.content().ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n");

        if let Some(sel) = file.selection().filter(|sel| !sel.is_empty()) {
            let _ = writeln!(out, "Selected text (characters {}..{}):", sel.start(), sel.end());
            let _ = writeln!(out, "```{}", file.language());
            out.push_str(sel.text());
            if !sel.text().ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n");
        }
    }

    if !context.open_files.is_empty() {
        out.push_str("Open files:\n");
        for open in &context.open_files {
            if open.language.is_empty() {
                let _ = writeln!(out, "- {}", open.path);
            } else {
                let _ = writeln!(out, "- {} ({})", open.path, open.language);
            }
        }
    }

    if !context.diagnostics.is_empty() {
        out.push_str("Diagnostics:\n");
        for diag in &context.diagnostics {
            let _ = writeln!(
                out,
                "- {}:{} [{}] {}",
                diag.file(),
                diag.line(),
                diag.severity(),
                diag.message()
            );
        }
    }

    out.trim_end().to_string()
}
