//! Dirty window accumulation.
//!
//! Every edit notification narrows down to the lines it touched. Consecutive
//! edits are folded into one window expressed in the coordinates the ranges
//! were stored in (the state before the first pending edit), together with the
//! net line shift, so the next validation diffs only that window.

use std::ops::Range as ByteRange;

use crate::text::LineText;

const LOG_TARGET: &str = "sabun::tracker";

/// A single text replacement reported by the host: `old_len` bytes at `offset`
/// became `new_len` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditEvent {
    pub offset: usize,
    pub old_len: usize,
    pub new_len: usize,
}

impl EditEvent {
    pub fn new(offset: usize, old_len: usize, new_len: usize) -> Self {
        Self {
            offset,
            old_len,
            new_len,
        }
    }

    /// The event describing `range` being replaced by `text`.
    pub fn replace(range: ByteRange<usize>, text: &str) -> Self {
        Self::new(range.start, range.end.saturating_sub(range.start), text.len())
    }

    /// End offset of the replaced text, if it lies within a text of `len` bytes.
    fn old_end(&self, len: usize) -> Option<usize> {
        self.offset.checked_add(self.old_len).filter(|end| *end <= len)
    }

    /// End offset of the inserted text, if it lies within a text of `len` bytes.
    fn new_end(&self, len: usize) -> Option<usize> {
        self.offset.checked_add(self.new_len).filter(|end| *end <= len)
    }
}

/// Lines touched since the last validation.
///
/// `line1..line2` are lines in stored-range coordinates; in the current
/// working buffer the same region spans `line1..line2 + line_shift`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyWindow {
    pub line1: usize,
    pub line2: usize,
    pub line_shift: isize,
    /// Working buffer line count before the first folded edit.
    pub total_lines_before: usize,
}

impl DirtyWindow {
    /// End of the window in the current working buffer.
    pub fn current_line2(&self) -> isize {
        self.line2 as isize + self.line_shift
    }

    /// Fold in an edit touching current lines `line1..line2` that changed the
    /// line count by `shift`.
    fn merge(self, line1: usize, line2: usize, shift: isize) -> Self {
        let current_end = self.current_line2();
        let unshift = |line: usize| (line as isize - self.line_shift).max(0) as usize;

        let old_line1 = if line1 < self.line1 {
            line1
        } else if line1 as isize >= current_end {
            unshift(line1)
        } else {
            self.line1
        };
        let old_line2 = if line2 <= self.line1 {
            line2
        } else if line2 as isize >= current_end {
            unshift(line2)
        } else {
            self.line2
        };

        Self {
            line1: self.line1.min(old_line1),
            line2: self.line2.max(old_line2),
            line_shift: self.line_shift + shift,
            total_lines_before: self.total_lines_before,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingEdit {
    event: EditEvent,
    line1: usize,
    old_lines: usize,
    total_lines: usize,
    removed_starts_with_newline: bool,
    removed_ends_with_newline: bool,
}

/// Folds before/after edit notifications into a [`DirtyWindow`].
#[derive(Debug, Default)]
pub(crate) struct DirtyWindowAccumulator {
    pending: Option<PendingEdit>,
    window: Option<DirtyWindow>,
}

impl DirtyWindowAccumulator {
    /// Record what is about to be replaced. `doc` is still the pre-edit text.
    pub(crate) fn before_change<T: LineText + ?Sized>(&mut self, doc: &T, event: &EditEvent) {
        if let Some(pending) = self.pending {
            log::warn!(
                target: LOG_TARGET,
                "before_change for {:?} while {:?} is still pending",
                event,
                pending.event
            );
        }

        let Some(old_end) = event.old_end(doc.text().len()) else {
            log::warn!(
                target: LOG_TARGET,
                "before_change for {:?} lies outside the {}-byte buffer",
                event,
                doc.text().len()
            );
            self.pending = None;
            return;
        };

        let line1 = doc.line_of_offset(event.offset);
        let old_lines = if event.old_len == 0 {
            1
        } else {
            doc.line_of_offset(old_end) - line1 + 1
        };
        let removed = doc.text().get(event.offset..old_end).unwrap_or_default();

        self.pending = Some(PendingEdit {
            event: *event,
            line1,
            old_lines,
            total_lines: doc.line_count(),
            removed_starts_with_newline: removed.starts_with('\n'),
            removed_ends_with_newline: removed.ends_with('\n'),
        });
    }

    /// Fold the finished edit into the window. `doc` is the post-edit text.
    ///
    /// Returns `false` when no matching `before_change` was seen or the event
    /// does not fit the buffer; the window can then no longer be trusted.
    pub(crate) fn after_change<T: LineText + ?Sized>(
        &mut self,
        doc: &T,
        event: &EditEvent,
    ) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        if pending.event != *event {
            return false;
        }
        let Some(new_end) = event.new_end(doc.text().len()) else {
            return false;
        };

        let new_lines = if event.new_len == 0 {
            1
        } else {
            doc.line_of_offset(new_end).saturating_sub(pending.line1) + 1
        };
        let shift = new_lines as isize - pending.old_lines as isize;
        let (line1, line2) = narrow_to_touched_lines(
            doc,
            &pending,
            new_end,
            pending.line1,
            pending.line1 + pending.old_lines,
        );

        self.window = Some(match self.window {
            None => DirtyWindow {
                line1,
                line2,
                line_shift: shift,
                total_lines_before: pending.total_lines,
            },
            Some(window) => window.merge(line1, line2, shift),
        });
        true
    }

    pub(crate) fn window(&self) -> Option<DirtyWindow> {
        self.window
    }

    /// Dirty while a window is pending or an edit is half reported.
    pub(crate) fn is_dirty(&self) -> bool {
        self.window.is_some() || self.pending.is_some()
    }

    pub(crate) fn clear_window(&mut self) {
        self.window = None;
    }

    pub(crate) fn clear(&mut self) {
        self.pending = None;
        self.window = None;
    }
}

/// An inserted or removed block that ends (or starts) with a newline next to
/// another newline only touches the lines on one side of it.
fn narrow_to_touched_lines<T: LineText + ?Sized>(
    doc: &T,
    pending: &PendingEdit,
    new_end: usize,
    line1: usize,
    line2: usize,
) -> (usize, usize) {
    let event = &pending.event;
    let bytes = doc.text().as_bytes();
    let newline_at = |offset: Option<usize>| {
        offset
            .and_then(|offset| bytes.get(offset))
            .is_some_and(|byte| *byte == b'\n')
    };

    if event.old_len == 0 && event.new_len != 0 {
        let inserted = doc.text().get(event.offset..new_end).unwrap_or_default();
        if inserted.ends_with('\n') && newline_at(event.offset.checked_sub(1)) {
            return (line1, line2 - 1);
        }
        if inserted.starts_with('\n') && newline_at(Some(new_end)) {
            return (line1 + 1, line2);
        }
    }

    if event.old_len != 0 && event.new_len == 0 {
        if pending.removed_ends_with_newline && newline_at(event.offset.checked_sub(1)) {
            return (line1, line2 - 1);
        }
        if pending.removed_starts_with_newline && newline_at(Some(event.offset)) {
            return (line1 + 1, line2);
        }
    }

    (line1, line2)
}
