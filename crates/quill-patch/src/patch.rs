//! Unified diff parsing and strict application.
//!
//! Lines keep their terminators (`\n` or `\r\n`) end to end, so a patch only
//! applies to content with the same line-ending convention and the same
//! final-newline state. Hunks apply at the position their header states; there
//! is no offset search and no fuzz.

use similar::TextDiff;

use crate::error::PatchError;

const NO_NEWLINE_MARKER: char = '\\';

/// One line of a hunk body, terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

impl HunkLine {
    fn text_mut(&mut self) -> &mut String {
        match self {
            Self::Context(text) | Self::Remove(text) | Self::Add(text) => text,
        }
    }
}

/// A contiguous change region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// Zero-based index of the first original line this hunk touches.
    fn position(&self) -> usize {
        if self.old_len == 0 {
            self.old_start
        } else {
            self.old_start - 1
        }
    }

    /// Zero-based index just past the last original line, if representable.
    fn end(&self) -> Option<usize> {
        self.position().checked_add(self.old_len)
    }
}

/// A parsed single-file unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    old_path: Option<String>,
    new_path: Option<String>,
    hunks: Vec<Hunk>,
}

impl Patch {
    /// Parse unified-diff text.
    pub fn parse(text: &str) -> Result<Self, PatchError> {
        Parser::default().run(text)
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    /// Path from the `---` header, with any `a/` prefix removed.
    pub fn old_path(&self) -> Option<&str> {
        self.old_path.as_deref()
    }

    /// Path from the `+++` header, with any `b/` prefix removed.
    pub fn new_path(&self) -> Option<&str> {
        self.new_path.as_deref()
    }

    /// Apply to `content`, producing the patched text.
    ///
    /// `content` is never modified; on conflict nothing is produced.
    pub fn apply(&self, content: &str) -> Result<String, PatchError> {
        let source: Vec<&str> = content.split_inclusive('\n').collect();
        let mut out = String::with_capacity(content.len());
        let mut cursor = 0;

        for (idx, hunk) in self.hunks.iter().enumerate() {
            let start = hunk.position();
            if start > source.len() {
                return Err(PatchError::Conflict {
                    hunk: idx + 1,
                    line: start.saturating_add(1),
                    expected: first_old_line(hunk).unwrap_or_default(),
                    found: None,
                });
            }

            for line in &source[cursor..start] {
                out.push_str(line);
            }

            let mut pos = start;
            for line in &hunk.lines {
                match line {
                    HunkLine::Context(expected) | HunkLine::Remove(expected) => {
                        match source.get(pos) {
                            Some(found) if found == expected => {}
                            found => {
                                return Err(PatchError::Conflict {
                                    hunk: idx + 1,
                                    line: pos + 1,
                                    expected: expected.clone(),
                                    found: found.map(|f| f.to_string()),
                                });
                            }
                        }
                        if matches!(line, HunkLine::Context(_)) {
                            out.push_str(expected);
                        }
                        pos += 1;
                    }
                    HunkLine::Add(added) => out.push_str(added),
                }
            }
            cursor = pos;
        }

        for line in &source[cursor..] {
            out.push_str(line);
        }
        Ok(out)
    }
}

fn first_old_line(hunk: &Hunk) -> Option<String> {
    hunk.lines.iter().find_map(|line| match line {
        HunkLine::Context(text) | HunkLine::Remove(text) => Some(text.clone()),
        HunkLine::Add(_) => None,
    })
}

/// Produce a unified diff turning `original` into `modified`.
pub fn create_patch(path: &str, original: &str, modified: &str) -> String {
    TextDiff::from_lines(original, modified)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Default)]
struct Parser {
    old_path: Option<String>,
    new_path: Option<String>,
    hunks: Vec<Hunk>,
    /// Old/new lines still expected by the hunk being read.
    remaining: Option<(usize, usize)>,
}

impl Parser {
    fn run(mut self, text: &str) -> Result<Patch, PatchError> {
        let mut line_no = 0;
        for raw in text.split_inclusive('\n') {
            line_no += 1;
            self.line(line_no, raw)?;
        }

        if let Some((old, new)) = self.remaining {
            return Err(PatchError::malformed(
                line_no,
                format!("hunk ended early: {old} original and {new} new lines missing"),
            ));
        }
        if self.hunks.is_empty() {
            return Err(PatchError::malformed(line_no, "patch has no hunks"));
        }

        Ok(Patch {
            old_path: self.old_path,
            new_path: self.new_path,
            hunks: self.hunks,
        })
    }

    fn line(&mut self, line_no: usize, raw: &str) -> Result<(), PatchError> {
        if raw.starts_with(NO_NEWLINE_MARKER) {
            return self.strip_last_newline(line_no);
        }

        if let Some((old, new)) = self.remaining {
            return self.body_line(line_no, raw, old, new);
        }

        if raw.starts_with("@@") {
            return self.hunk_header(line_no, raw);
        }

        if let Some(path) = raw.strip_prefix("--- ") {
            if !self.hunks.is_empty() {
                return Err(PatchError::malformed(line_no, "patch touches more than one file"));
            }
            self.old_path = header_path(path, "a/");
        } else if let Some(path) = raw.strip_prefix("+++ ") {
            self.new_path = header_path(path, "b/");
        } else if matches!(raw.chars().next(), Some(' ' | '-' | '+')) && !self.hunks.is_empty() {
            return Err(PatchError::malformed(
                line_no,
                "hunk has more lines than its header declares",
            ));
        }
        // Anything else is preamble (`diff --git`, `index`, mode lines) or trailer.
        Ok(())
    }

    fn hunk_header(&mut self, line_no: usize, raw: &str) -> Result<(), PatchError> {
        let (old_start, old_len, new_start, new_len) = parse_hunk_header(raw)
            .ok_or_else(|| PatchError::malformed(line_no, "invalid hunk header"))?;

        if old_start == 0 && old_len != 0 {
            return Err(PatchError::malformed(line_no, "hunk starts at line 0"));
        }

        let hunk = Hunk {
            old_start,
            old_len,
            new_start,
            new_len,
            lines: Vec::new(),
        };

        if hunk.end().is_none() {
            return Err(PatchError::malformed(line_no, "hunk range out of bounds"));
        }
        if let Some(prev_end) = self.hunks.last().and_then(Hunk::end) {
            if hunk.position() < prev_end {
                return Err(PatchError::malformed(line_no, "hunks overlap or are out of order"));
            }
        }

        self.remaining = (old_len > 0 || new_len > 0).then_some((old_len, new_len));
        self.hunks.push(hunk);
        Ok(())
    }

    fn body_line(
        &mut self,
        line_no: usize,
        raw: &str,
        old: usize,
        new: usize,
    ) -> Result<(), PatchError> {
        let mut chars = raw.chars();
        let (line, old, new) = match chars.next() {
            Some(' ') if old > 0 && new > 0 => {
                (HunkLine::Context(terminated(chars.as_str())), old - 1, new - 1)
            }
            Some('-') if old > 0 => (HunkLine::Remove(terminated(chars.as_str())), old - 1, new),
            Some('+') if new > 0 => (HunkLine::Add(terminated(chars.as_str())), old, new - 1),
            // Editors often strip the single space of an empty context line.
            Some('\n' | '\r') if old > 0 && new > 0 => {
                (HunkLine::Context(raw.to_string()), old - 1, new - 1)
            }
            Some(' ' | '-' | '+' | '\n' | '\r') => {
                return Err(PatchError::malformed(
                    line_no,
                    "hunk has more lines than its header declares",
                ));
            }
            _ => {
                return Err(PatchError::malformed(
                    line_no,
                    format!("unexpected line in hunk: {:?}", raw.trim_end()),
                ));
            }
        };

        if let Some(hunk) = self.hunks.last_mut() {
            hunk.lines.push(line);
        }
        self.remaining = (old > 0 || new > 0).then_some((old, new));
        Ok(())
    }

    fn strip_last_newline(&mut self, line_no: usize) -> Result<(), PatchError> {
        let last = self
            .hunks
            .last_mut()
            .and_then(|hunk| hunk.lines.last_mut())
            .ok_or_else(|| PatchError::malformed(line_no, "no-newline marker outside a hunk"))?;

        let text = last.text_mut();
        if text.ends_with('\n') {
            text.pop();
        }
        Ok(())
    }
}

/// A final unterminated patch line is treated as `\n`-terminated; only the
/// explicit marker means "no newline at end of file".
fn terminated(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

fn header_path(raw: &str, prefix: &str) -> Option<String> {
    let path = raw.trim_end().split('\t').next().unwrap_or_default().trim();
    if path.is_empty() || path == "/dev/null" {
        return None;
    }
    Some(path.strip_prefix(prefix).unwrap_or(path).to_string())
}

/// Parse `@@ -a[,b] +c[,d] @@ ...`.
fn parse_hunk_header(raw: &str) -> Option<(usize, usize, usize, usize)> {
    let rest = raw.strip_prefix("@@ ")?;
    let (ranges, _) = rest.split_once(" @@")?;
    let (old, new) = ranges.split_once(' ')?;
    let (old_start, old_len) = parse_range(old.strip_prefix('-')?)?;
    let (new_start, new_len) = parse_range(new.strip_prefix('+')?)?;
    Some((old_start, old_len, new_start, new_len))
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &str = "fn main() {\n    let x = 1;\n    println!(\"{x}\");\n}\n";

    #[test]
    fn test_parse_headers_and_hunks() {
        let patch = Patch::parse(
            "diff --git a/src/main.rs b/src/main.rs\n\
             index 83db48f..bf269f4 100644\n\
             --- a/src/main.rs\n\
             +++ b/src/main.rs\n\
             @@ -1,4 +1,4 @@\n \
             fn main() {\n\
             -    let x = 1;\n\
             +    let x = 2;\n     \
             println!(\"{x}\");\n \
             }\n",
        )
        .unwrap();

        assert_eq!(patch.old_path(), Some("src/main.rs"));
        assert_eq!(patch.new_path(), Some("src/main.rs"));
        assert_eq!(patch.hunks().len(), 1);
        assert_eq!(patch.hunks()[0].lines.len(), 5);
    }

    #[test]
    fn test_apply_replaces_line() {
        let patch = Patch::parse(
            "@@ -1,3 +1,3 @@\n fn main() {\n-    let x = 1;\n+    let x = 2;\n     println!(\"{x}\");\n",
        )
        .unwrap();
        let out = patch.apply(ORIGINAL).unwrap();
        assert_eq!(out, "fn main() {\n    let x = 2;\n    println!(\"{x}\");\n}\n");
    }

    #[test]
    fn test_apply_conflict_reports_location() {
        let patch = Patch::parse("@@ -2 +2 @@\n-    let x = 5;\n+    let x = 6;\n").unwrap();
        let err = patch.apply(ORIGINAL).unwrap_err();
        assert_eq!(
            err,
            PatchError::Conflict {
                hunk: 1,
                line: 2,
                expected: "    let x = 5;\n".to_string(),
                found: Some("    let x = 1;\n".to_string()),
            }
        );
    }

    #[test]
    fn test_no_offset_search() {
        // The removed line exists, but one line further down than stated.
        let patch = Patch::parse("@@ -1 +1 @@\n-    let x = 1;\n+    let x = 2;\n").unwrap();
        assert!(patch.apply(ORIGINAL).unwrap_err().is_conflict());
    }

    #[test]
    fn test_line_endings_must_match() {
        let crlf = "a\r\nb\r\n";
        let lf_patch = Patch::parse("@@ -1,2 +1,2 @@\n a\n-b\n+c\n").unwrap();
        assert!(lf_patch.apply(crlf).unwrap_err().is_conflict());

        let crlf_patch = Patch::parse("@@ -1,2 +1,2 @@\r\n a\r\n-b\r\n+c\r\n").unwrap();
        assert_eq!(crlf_patch.apply(crlf).unwrap(), "a\r\nc\r\n");
    }

    #[test]
    fn test_no_newline_marker() {
        let patch = Patch::parse(
            "@@ -1,2 +1,2 @@\n a\n-b\n\\ No newline at end of file\n+b\n",
        )
        .unwrap();
        assert_eq!(patch.apply("a\nb").unwrap(), "a\nb\n");
        // The file already ends with a newline, so `-b` without one conflicts.
        assert!(patch.apply("a\nb\n").unwrap_err().is_conflict());
    }

    #[test]
    fn test_insert_into_empty_file() {
        let patch = Patch::parse("--- /dev/null\n+++ b/new.txt\n@@ -0,0 +1,2 @@\n+one\n+two\n")
            .unwrap();
        assert_eq!(patch.old_path(), None);
        assert_eq!(patch.new_path(), Some("new.txt"));
        assert_eq!(patch.apply("").unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_multiple_hunks() {
        let original: String = (1..=10).map(|n| format!("line {n}\n")).collect();
        let patch = Patch::parse(
            "@@ -2 +2 @@\n-line 2\n+LINE 2\n@@ -9,0 +10 @@\n+inserted\n",
        )
        .unwrap();
        let out = patch.apply(&original).unwrap();
        assert!(out.starts_with("line 1\nLINE 2\nline 3\n"));
        assert!(out.ends_with("line 9\ninserted\nline 10\n"));
    }

    #[test]
    fn test_malformed_patches() {
        let cases = [
            ("", "patch has no hunks"),
            ("@@ -1 +1\n-a\n+b\n", "invalid hunk header"),
            ("@@ -1,2 +1,2 @@\n a\n", "hunk ended early"),
            ("@@ -1 +1 @@\n-a\n+b\n+c\n", "more lines"),
            ("@@ -1 +1 @@\n?a\n", "unexpected line"),
            ("@@ -3 +3 @@\n-c\n+C\n@@ -1 +1 @@\n-a\n+A\n", "out of order"),
            ("\\ No newline at end of file\n", "outside a hunk"),
            (
                "--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n--- a/y\n+++ b/y\n",
                "more than one file",
            ),
        ];
        for (text, reason) in cases {
            match Patch::parse(text) {
                Err(PatchError::Malformed { reason: got, .. }) => {
                    assert!(got.contains(reason), "{text:?}: {got}")
                }
                other => panic!("{text:?}: expected malformed, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_huge_line_numbers_do_not_overflow() {
        let far = format!("@@ -{},0 +1 @@\n+x\n", usize::MAX);
        let patch = Patch::parse(&far).unwrap();
        match patch.apply("a\n").unwrap_err() {
            PatchError::Conflict { hunk, line, .. } => {
                assert_eq!(hunk, 1);
                assert_eq!(line, usize::MAX);
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        let wrapping = format!(
            "@@ -{},2 +1,2 @@\n a\n b\n@@ -5 +5 @@\n-c\n+C\n",
            usize::MAX
        );
        match Patch::parse(&wrapping) {
            Err(PatchError::Malformed { line, reason }) => {
                assert_eq!(line, 1);
                assert!(reason.contains("out of bounds"), "{reason}");
            }
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_context_line_without_space() {
        let patch = Patch::parse("@@ -1,3 +1,3 @@\n a\n\n-c\n+C\n").unwrap();
        assert_eq!(patch.apply("a\n\nc\n").unwrap(), "a\n\nC\n");
    }

    #[test]
    fn test_created_patch_applies() {
        let modified = "fn main() {\n    let x = 2;\n    println!(\"{x}\");\n}\n";
        let text = create_patch("src/main.rs", ORIGINAL, modified);
        assert!(text.starts_with("--- a/src/main.rs\n+++ b/src/main.rs\n"));

        let patch = Patch::parse(&text).unwrap();
        assert_eq!(patch.apply(ORIGINAL).unwrap(), modified);
    }

    #[test]
    fn test_created_patch_preserves_missing_newline() {
        let original = "alpha\nbeta";
        let modified = "alpha\ngamma";
        let patch = Patch::parse(&create_patch("f.txt", original, modified)).unwrap();
        assert_eq!(patch.apply(original).unwrap(), modified);
    }

    #[test]
    fn test_created_patch_preserves_crlf() {
        let original = "one\r\ntwo\r\nthree\r\n";
        let modified = "one\r\n2\r\nthree\r\n";
        let patch = Patch::parse(&create_patch("f.txt", original, modified)).unwrap();
        assert_eq!(patch.apply(original).unwrap(), modified);
    }
}
