use std::ops::Range as ByteRange;

use super::lines::{LineText, WorkingBuffer, compute_line_starts, line_of};

/// A text document with cached line starts.
#[derive(Clone, Debug)]
pub struct TextDocument {
    text: String,
    line_starts: Vec<usize>,
    version: Option<i32>,
}

impl TextDocument {
    /// Create a new text document
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let line_starts = compute_line_starts(&text);
        Self {
            text,
            line_starts,
            version: None,
        }
    }

    /// Create a new text document with version
    pub fn with_version(text: impl Into<String>, version: i32) -> Self {
        Self {
            version: Some(version),
            ..Self::new(text)
        }
    }

    /// Get the text content as owned String
    pub fn into_text(self) -> String {
        self.text
    }

    /// Get the document version. Every edit bumps a present version.
    pub fn version(&self) -> Option<i32> {
        self.version
    }

    /// Replace the whole content
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.line_starts = compute_line_starts(&self.text);
        self.bump_version();
    }

    /// Get the length in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if the document is empty
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn bump_version(&mut self) {
        if let Some(version) = self.version.as_mut() {
            *version += 1;
        }
    }
}

impl Default for TextDocument {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl LineText for TextDocument {
    fn text(&self) -> &str {
        &self.text
    }

    fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    fn line_start(&self, line: usize) -> usize {
        self.line_starts
            .get(line)
            .copied()
            .unwrap_or(self.text.len())
    }

    fn line_of_offset(&self, offset: usize) -> usize {
        line_of(&self.line_starts, offset.min(self.text.len()))
    }
}

impl WorkingBuffer for TextDocument {
    fn replace_range(&mut self, range: ByteRange<usize>, text: &str) {
        let start = range.start;
        self.text.replace_range(range, text);

        // Line starts up to the edit offset are unaffected.
        let keep = self.line_starts.partition_point(|&line_start| line_start <= start);
        self.line_starts.truncate(keep);
        self.line_starts.extend(
            self.text.as_bytes()[start..]
                .iter()
                .enumerate()
                .filter(|(_, byte)| **byte == b'\n')
                .map(|(offset, _)| start + offset + 1),
        );
        self.bump_version();
    }
}
