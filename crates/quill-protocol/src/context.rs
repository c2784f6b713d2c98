//! Editor state snapshot sent alongside a prompt.
//!
//! Every type here validates on construction and on deserialization, so a
//! value that exists always satisfies its invariants. Nothing is mutable after
//! construction; accessors hand out borrows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};

// ============================================================================
// Selection
// ============================================================================

/// A half-open character range `[start, end)` inside the active file.
///
/// `text` always equals the content at that range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    start: usize,
    end: usize,
    text: String,
}

impl Selection {
    /// Resolve a selection against `content`.
    ///
    /// Offsets count characters, not bytes.
    pub fn resolve(
        content: &str,
        start: i64,
        end: i64,
        text: impl Into<String>,
    ) -> ValidationResult<Self> {
        if start < 0 || end < 0 {
            return Err(ValidationError::NegativeSelection { start, end });
        }
        if start > end {
            return Err(ValidationError::InvertedSelection { start, end });
        }

        let (start, end) = (start as usize, end as usize);
        let selected = char_slice(content, start, end).ok_or_else(|| {
            ValidationError::SelectionOutOfBounds {
                end,
                len: content.chars().count(),
            }
        })?;

        let text = text.into();
        if selected != text {
            return Err(ValidationError::SelectionMismatch { start, end });
        }

        Ok(Self { start, end, text })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Slice `content` by character offsets. `None` when `end` is out of range.
fn char_slice(content: &str, start: usize, end: usize) -> Option<&str> {
    let mut offsets = content
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(content.len()));

    let begin = offsets.nth(start)?;
    let finish = if end == start {
        begin
    } else {
        offsets.nth(end - start - 1)?
    };
    Some(&content[begin..finish])
}

#[derive(Debug, Deserialize)]
struct RawSelection {
    start: i64,
    end: i64,
    text: String,
}

// ============================================================================
// Active file
// ============================================================================

/// The file focused in the editor, with its full content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawActiveFile", rename_all = "camelCase")]
pub struct ActiveFile {
    path: String,
    content: String,
    language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    selection: Option<Selection>,
}

impl ActiveFile {
    pub fn new(
        path: impl Into<String>,
        content: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            language: language.into(),
            selection: None,
        }
    }

    /// Attach a selection, validated against this file's content.
    pub fn with_selection(
        mut self,
        start: i64,
        end: i64,
        text: impl Into<String>,
    ) -> ValidationResult<Self> {
        self.selection = Some(Selection::resolve(&self.content, start, end, text)?);
        Ok(self)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActiveFile {
    path: String,
    content: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    selection: Option<RawSelection>,
}

impl TryFrom<RawActiveFile> for ActiveFile {
    type Error = ValidationError;

    fn try_from(raw: RawActiveFile) -> Result<Self, Self::Error> {
        let file = ActiveFile::new(raw.path, raw.content, raw.language);
        match raw.selection {
            Some(sel) => file.with_selection(sel.start, sel.end, sel.text),
            None => Ok(file),
        }
    }
}

// ============================================================================
// Open files
// ============================================================================

/// A file open in another editor tab. Content is not transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFile {
    pub path: String,
    #[serde(default)]
    pub language: String,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Severity of an editor diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Hint => "hint",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "hint" => Ok(Self::Hint),
            other => Err(ValidationError::UnknownSeverity(other.to_string())),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, ValidationError> {
        value.parse()
    }
}

impl From<Severity> for &'static str {
    fn from(value: Severity) -> Self {
        value.as_str()
    }
}

/// An editor-reported issue attached to a file and a 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDiagnostic")]
pub struct Diagnostic {
    file: String,
    message: String,
    severity: Severity,
    line: u32,
}

impl Diagnostic {
    pub fn new(
        file: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        line: u32,
    ) -> ValidationResult<Self> {
        if line == 0 {
            return Err(ValidationError::InvalidLine(line));
        }
        Ok(Self {
            file: file.into(),
            message: message.into(),
            severity,
            line,
        })
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

#[derive(Debug, Deserialize)]
struct RawDiagnostic {
    file: String,
    message: String,
    severity: String,
    line: u32,
}

impl TryFrom<RawDiagnostic> for Diagnostic {
    type Error = ValidationError;

    fn try_from(raw: RawDiagnostic) -> Result<Self, Self::Error> {
        Diagnostic::new(raw.file, raw.message, raw.severity.parse()?, raw.line)
    }
}

// ============================================================================
// Context
// ============================================================================

/// Snapshot of editor state at request time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChatContext", rename_all = "camelCase")]
pub struct ChatContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_file: Option<ActiveFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open_files: Vec<OpenFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl ChatContext {
    pub fn is_empty(&self) -> bool {
        self.active_file.is_none() && self.open_files.is_empty() && self.diagnostics.is_empty()
    }
}

/// Unvalidated context, converted outside serde so callers see the typed error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawChatContext {
    #[serde(default)]
    active_file: Option<RawActiveFile>,
    #[serde(default)]
    open_files: Vec<OpenFile>,
    #[serde(default)]
    diagnostics: Vec<RawDiagnostic>,
}

impl TryFrom<RawChatContext> for ChatContext {
    type Error = ValidationError;

    fn try_from(raw: RawChatContext) -> Result<Self, Self::Error> {
        Ok(Self {
            active_file: raw.active_file.map(ActiveFile::try_from).transpose()?,
            open_files: raw.open_files,
            diagnostics: raw
                .diagnostics
                .into_iter()
                .map(Diagnostic::try_from)
                .collect::<ValidationResult<_>>()?,
        })
    }
}
