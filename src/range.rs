//! Line ranges describing one contiguous difference between the working
//! buffer and the base buffer.

use serde::Serialize;

/// Classification of a [`Range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeKind {
    /// Lines present only in the working buffer.
    Inserted,
    /// Lines present only in the base buffer.
    Deleted,
    /// Lines replaced by different lines.
    Modified,
}

/// A pair of half-open line intervals: `line1..line2` in the working buffer and
/// `vcs_line1..vcs_line2` in the base buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    pub line1: usize,
    pub line2: usize,
    pub vcs_line1: usize,
    pub vcs_line2: usize,
    /// Both sides differ only in whitespace. Only set for modifications, and only
    /// when whitespace detection is enabled.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub whitespace_only: bool,
}

impl Range {
    pub fn new(line1: usize, line2: usize, vcs_line1: usize, vcs_line2: usize) -> Self {
        debug_assert!(line1 <= line2 && vcs_line1 <= vcs_line2);
        Self {
            line1,
            line2,
            vcs_line1,
            vcs_line2,
            whitespace_only: false,
        }
    }

    pub fn with_whitespace_only(mut self, whitespace_only: bool) -> Self {
        self.whitespace_only = whitespace_only;
        self
    }

    pub fn kind(&self) -> RangeKind {
        if self.vcs_line1 == self.vcs_line2 {
            RangeKind::Inserted
        } else if self.line1 == self.line2 {
            RangeKind::Deleted
        } else {
            RangeKind::Modified
        }
    }

    /// Number of lines this range occupies in the working buffer.
    pub fn working_len(&self) -> usize {
        self.line2 - self.line1
    }

    /// Number of lines this range occupies in the base buffer.
    pub fn base_len(&self) -> usize {
        self.vcs_line2 - self.vcs_line1
    }

    /// Change in working-buffer line count caused by rolling this range back.
    pub(crate) fn rollback_delta(&self) -> isize {
        self.base_len() as isize - self.working_len() as isize
    }

    /// Move the working-side interval by `delta` lines. The base side never moves.
    pub(crate) fn shifted(self, delta: isize) -> Self {
        Self {
            line1: apply_delta(self.line1, delta),
            line2: apply_delta(self.line2, delta),
            ..self
        }
    }

    /// Re-base a range computed on slices starting at the given lines.
    pub(crate) fn offset(self, line: usize, vcs_line: usize) -> Self {
        Self {
            line1: self.line1 + line,
            line2: self.line2 + line,
            vcs_line1: self.vcs_line1 + vcs_line,
            vcs_line2: self.vcs_line2 + vcs_line,
            ..self
        }
    }
}

/// Apply a signed delta to a line number, clamping at zero.
pub(crate) fn apply_delta(line: usize, delta: isize) -> usize {
    (line as isize).saturating_add(delta).max(0) as usize
}
