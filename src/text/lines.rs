use std::ops::Range as ByteRange;

/// Read access to a text addressed by lines.
///
/// Lines are separated by `\n`. A text containing `n` newlines has `n + 1`
/// lines, so the empty text has a single empty line and a trailing newline
/// produces an empty last line. Line contents never include the `\n`.
pub trait LineText {
    /// The whole text.
    fn text(&self) -> &str;

    /// Number of lines (always at least one).
    fn line_count(&self) -> usize;

    /// Byte offset where `line` starts. Lines past the end map to `text().len()`.
    fn line_start(&self, line: usize) -> usize;

    /// Line containing the byte `offset`. Offsets past the end map to the last line.
    fn line_of_offset(&self, offset: usize) -> usize;

    /// Byte offset where `line` ends, excluding its newline.
    fn line_end(&self, line: usize) -> usize {
        if line + 1 < self.line_count() {
            self.line_start(line + 1) - 1
        } else {
            self.text().len()
        }
    }

    /// Content of a single line.
    fn line(&self, line: usize) -> &str {
        let start = self.line_start(line);
        let end = self.line_end(line).max(start);
        &self.text()[start..end]
    }

    /// Owned contents of lines `line1..line2`.
    fn lines(&self, line1: usize, line2: usize) -> Vec<String> {
        (line1..line2.min(self.line_count()))
            .map(|line| self.line(line).to_string())
            .collect()
    }

    /// Byte span covering lines `line1..line2` without the final newline.
    /// `None` when the span is empty.
    fn lines_span(&self, line1: usize, line2: usize) -> Option<ByteRange<usize>> {
        if line1 >= line2 || line1 >= self.line_count() {
            return None;
        }
        let last = (line2 - 1).min(self.line_count() - 1);
        Some(self.line_start(line1)..self.line_end(last))
    }

    /// Text of lines `line1..line2` joined by `\n`, without a trailing newline.
    fn lines_text(&self, line1: usize, line2: usize) -> &str {
        match self.lines_span(line1, line2) {
            Some(span) => &self.text()[span],
            None => "",
        }
    }
}

/// A working buffer: line-addressable and mutable by the tracker during rollback.
pub trait WorkingBuffer: LineText {
    /// Replace the bytes in `range` with `text`.
    ///
    /// # Panics
    /// Like [`String::replace_range`], if the range is out of bounds or does not
    /// lie on character boundaries.
    fn replace_range(&mut self, range: ByteRange<usize>, text: &str);
}

/// Compute line start offsets for efficient line lookup
pub fn compute_line_starts(text: &str) -> Vec<usize> {
    let mut line_starts = vec![0];
    line_starts.extend(
        text.bytes()
            .enumerate()
            .filter(|(_, byte)| *byte == b'\n')
            .map(|(offset, _)| offset + 1),
    );
    line_starts
}

/// Whether lines `line1..line2` of `text` contain only whitespace.
/// An empty span counts as blank.
pub fn is_blank<T: LineText + ?Sized>(text: &T, line1: usize, line2: usize) -> bool {
    text.lines_text(line1, line2).trim().is_empty()
}

/// Locate `offset` in a sorted list of line starts.
pub(crate) fn line_of(line_starts: &[usize], offset: usize) -> usize {
    match line_starts.binary_search(&offset) {
        Ok(line) => line,
        Err(line) => line.saturating_sub(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TextDocument;

    #[test]
    fn test_compute_line_starts() {
        assert_eq!(compute_line_starts(""), vec![0]);
        assert_eq!(compute_line_starts("a\nb\nc\n"), vec![0, 2, 4, 6]);
        assert_eq!(compute_line_starts("abc"), vec![0]);
    }

    #[test]
    fn test_trailing_newline_yields_empty_last_line() {
        let doc = TextDocument::new("a\nb\n");
        assert_eq!(doc.line_count(), 3);
        assert_eq!(doc.line(2), "");
        assert_eq!(doc.line_end(1), 3);
    }

    #[test]
    fn test_line_of_offset_at_boundaries() {
        let doc = TextDocument::new("ab\ncd\n");
        assert_eq!(doc.line_of_offset(0), 0);
        assert_eq!(doc.line_of_offset(2), 0); // the newline belongs to line 0
        assert_eq!(doc.line_of_offset(3), 1);
        assert_eq!(doc.line_of_offset(6), 2);
        assert_eq!(doc.line_of_offset(100), 2);
    }

    #[test]
    fn test_lines_text_excludes_final_newline() {
        let doc = TextDocument::new("a\nb\nc\n");
        assert_eq!(doc.lines_text(0, 2), "a\nb");
        assert_eq!(doc.lines_text(1, 1), "");
        assert_eq!(doc.lines_text(3, 4), "");
        assert_eq!(doc.lines(1, 10), vec!["b", "c", ""]);
    }

    #[test]
    fn test_is_blank() {
        let doc = TextDocument::new("a\n  \n\t\nb");
        assert!(is_blank(&doc, 1, 3));
        assert!(is_blank(&doc, 2, 2));
        assert!(!is_blank(&doc, 0, 2));
        assert!(!is_blank(&doc, 2, 4));
    }

    #[test]
    fn test_multibyte_offsets() {
        let doc = TextDocument::new("あい\nう");
        assert_eq!(doc.line_start(1), 7);
        assert_eq!(doc.line(1), "う");
        assert_eq!(doc.line_of_offset(6), 0);
    }
}
