//! A single user turn sent by the editor.

use serde::{Deserialize, Serialize};

use crate::context::{ChatContext, RawChatContext};
use crate::error::{ValidationError, ValidationResult};

/// One user prompt plus the editor context it was asked in.
///
/// Constructed only through [`ChatRequest::new`] or deserialization, both of
/// which reject an empty prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChatRequest", rename_all = "camelCase")]
pub struct ChatRequest {
    prompt: String,
    #[serde(skip_serializing_if = "ChatContext::is_empty")]
    context: ChatContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    stream: bool,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> ValidationResult<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        Ok(Self {
            prompt,
            context: ChatContext::default(),
            model: None,
            stream: false,
        })
    }

    pub fn with_context(mut self, context: ChatContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Parse and validate a JSON request body.
    ///
    /// Syntax and shape errors come back as [`ValidationError::Malformed`];
    /// invariant violations keep their own variant.
    pub fn from_json(body: &str) -> ValidationResult<Self> {
        serde_json::from_str::<RawChatRequest>(body)?.try_into()
    }

    /// Parse and validate a raw JSON request body.
    pub fn from_slice(body: &[u8]) -> ValidationResult<Self> {
        serde_json::from_slice::<RawChatRequest>(body)?.try_into()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn context(&self) -> &ChatContext {
        &self.context
    }

    /// The requested model, or `None` when the configured default applies.
    pub fn model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
    }

    pub fn is_streaming(&self) -> bool {
        self.stream
    }
}

#[derive(Debug, Deserialize)]
struct RawChatRequest {
    prompt: String,
    #[serde(default)]
    context: RawChatContext,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stream: Option<bool>,
}

impl TryFrom<RawChatRequest> for ChatRequest {
    type Error = ValidationError;

    fn try_from(raw: RawChatRequest) -> Result<Self, Self::Error> {
        let mut request = ChatRequest::new(raw.prompt)?.with_context(raw.context.try_into()?);
        request.model = raw.model;
        request.stream = raw.stream.unwrap_or(false);
        Ok(request)
    }
}
