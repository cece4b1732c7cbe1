//! Sorted storage of the current ranges and the queries answered from it.

use crate::range::Range;
use crate::text::{LineText, is_blank};

/// Direction of a line transfer between the two buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDirection {
    /// Map a working buffer line to the base buffer.
    ToBase,
    /// Map a base buffer line to the working buffer.
    ToWorking,
}

/// Split of the stored ranges around a dirty window: `ranges[..before]` lie
/// strictly before it, `ranges[after..]` strictly after it, and everything in
/// between is recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Partition {
    pub before: usize,
    pub after: usize,
}

/// Ranges sorted by position, non-overlapping on both sides.
#[derive(Debug, Default, Clone)]
pub(crate) struct RangeStore {
    ranges: Vec<Range>,
}

impl RangeStore {
    pub(crate) fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub(crate) fn contains(&self, range: &Range) -> bool {
        self.ranges.contains(range)
    }

    /// Replace every range, returning the previous ones.
    pub(crate) fn replace_all(&mut self, ranges: Vec<Range>) -> Vec<Range> {
        std::mem::replace(&mut self.ranges, ranges)
    }

    pub(crate) fn clear(&mut self) -> Vec<Range> {
        self.replace_all(Vec::new())
    }

    /// Partition the ranges around the window `line1..line2` (stored
    /// coordinates). With `merge_blank_gaps`, neighbours separated from the
    /// changed region only by blank lines of the current buffer `doc` are
    /// pulled into it.
    pub(crate) fn partition<T: LineText + ?Sized>(
        &self,
        doc: &T,
        line1: usize,
        line2: usize,
        line_shift: isize,
        merge_blank_gaps: bool,
    ) -> Partition {
        let ranges = &self.ranges;
        let mut before = ranges.partition_point(|range| range.line2 < line1);
        let mut after = ranges.partition_point(|range| range.line1 <= line2);

        if !merge_blank_gaps {
            return Partition { before, after };
        }

        // Ranges before the window keep their coordinates in the current buffer.
        while before > 0 {
            let changed_start = ranges
                .get(before)
                .map_or(line1, |range| range.line1.min(line1));
            if !is_blank(doc, ranges[before - 1].line2, changed_start) {
                break;
            }
            before -= 1;
        }

        // Ranges after the window are displaced by the pending shift.
        let current = |line: usize| (line as isize + line_shift).max(0) as usize;
        while after < ranges.len() {
            let mut changed_end = current(line2);
            if after > 0 {
                changed_end = changed_end.max(current(ranges[after - 1].line2));
            }
            if !is_blank(doc, changed_end, current(ranges[after].line1)) {
                break;
            }
            after += 1;
        }

        Partition { before, after }
    }

    pub(crate) fn changed(&self, partition: Partition) -> &[Range] {
        &self.ranges[partition.before..partition.after]
    }

    pub(crate) fn last_before(&self, partition: Partition) -> Option<&Range> {
        partition
            .before
            .checked_sub(1)
            .and_then(|index| self.ranges.get(index))
    }

    pub(crate) fn first_after(&self, partition: Partition) -> Option<&Range> {
        self.ranges.get(partition.after)
    }

    /// Replace the changed ranges with `changed` and move every following
    /// range by `shift`. Returns the replaced ranges.
    pub(crate) fn splice(
        &mut self,
        partition: Partition,
        changed: Vec<Range>,
        shift: isize,
    ) -> Vec<Range> {
        let after: Vec<Range> = self
            .ranges
            .drain(partition.after..)
            .map(|range| range.shifted(shift))
            .collect();
        let old = self.ranges.drain(partition.before..).collect();
        self.ranges.extend(changed);
        self.ranges.extend(after);
        old
    }

    /// Drop the rolled back ranges (sorted, all present) and move the others
    /// by the line count change of the rollbacks preceding them.
    pub(crate) fn remove_rolled_back(&mut self, rolled_back: &[Range]) -> Vec<Range> {
        let mut pending = rolled_back.iter().peekable();
        let mut shift = 0isize;
        let mut removed = Vec::with_capacity(rolled_back.len());
        let mut kept = Vec::with_capacity(self.ranges.len());

        for range in self.ranges.drain(..) {
            if pending.peek() == Some(&&range) {
                pending.next();
                shift += range.rollback_delta();
                removed.push(range);
            } else {
                kept.push(range.shifted(shift));
            }
        }
        self.ranges = kept;
        removed
    }

    /// Verify the stored ranges against buffers of the given line counts.
    pub(crate) fn check(&self, working_lines: usize, base_lines: usize) -> Result<(), String> {
        check_ranges(&self.ranges, (0, 0), (working_lines, base_lines))
    }

    /// The range covering `line`. A deletion covers the line it sits before.
    pub(crate) fn range_for_line(&self, line: usize) -> Option<Range> {
        self.ranges
            .iter()
            .take_while(|range| range.line1 <= line)
            .find(|range| is_selected_by_line(range, line))
            .copied()
    }

    pub(crate) fn is_line_modified(&self, line: usize) -> bool {
        self.ranges
            .iter()
            .take_while(|range| range.line1 <= line)
            .any(|range| line < range.line2)
    }

    /// Whether any range touches lines `line1..line2`.
    pub(crate) fn is_range_modified(&self, line1: usize, line2: usize) -> bool {
        if line1 >= line2 {
            return false;
        }
        self.ranges
            .iter()
            .take_while(|range| range.line1 < line2)
            .any(|range| range.line2 > line1 || (range.line1 == range.line2 && range.line1 >= line1))
    }

    /// First range starting after `line`.
    pub(crate) fn next_range(&self, line: usize) -> Option<Range> {
        self.ranges
            .iter()
            .find(|range| range.line1 > line)
            .copied()
    }

    /// Last range ending at or before `line`, other than the one covering it.
    pub(crate) fn prev_range(&self, line: usize) -> Option<Range> {
        self.ranges
            .iter()
            .rev()
            .find(|range| range.line2 <= line && !is_selected_by_line(range, line))
            .copied()
    }

    /// Map `line` to the other buffer. A line inside a range has no exact
    /// counterpart: `approximate` yields the start of the range on the other
    /// side, otherwise `None`.
    pub(crate) fn transfer_line(
        &self,
        line: usize,
        direction: LineDirection,
        approximate: bool,
    ) -> Option<usize> {
        let mut result = line as isize;
        for range in &self.ranges {
            let (start, end, other_start, other_end) = match direction {
                LineDirection::ToBase => {
                    (range.line1, range.line2, range.vcs_line1, range.vcs_line2)
                }
                LineDirection::ToWorking => {
                    (range.vcs_line1, range.vcs_line2, range.line1, range.line2)
                }
            };
            if (start..end).contains(&line) {
                return approximate.then_some(other_start);
            }
            if end > line {
                break;
            }
            result += (other_end - other_start) as isize - (end - start) as isize;
        }
        Some(result.max(0) as usize)
    }
}

/// Verify that `ranges` are ordered, non-empty and lie between the line
/// pairs `start` and `end` (working, base), and that every unchanged stretch
/// has the same length on both sides.
pub(crate) fn check_ranges(
    ranges: &[Range],
    start: (usize, usize),
    end: (usize, usize),
) -> Result<(), String> {
    let (mut line, mut vcs_line) = start;
    for range in ranges {
        if range.line1 > range.line2 || range.vcs_line1 > range.vcs_line2 {
            return Err(format!("inverted range {range:?}"));
        }
        if range.line1 == range.line2 && range.vcs_line1 == range.vcs_line2 {
            return Err(format!("empty range {range:?}"));
        }
        if range.line1 < line || range.vcs_line1 < vcs_line {
            return Err(format!("range {range:?} overlaps its predecessor"));
        }
        if range.line1 - line != range.vcs_line1 - vcs_line {
            return Err(format!("unchanged lines before {range:?} differ in length"));
        }
        (line, vcs_line) = (range.line2, range.vcs_line2);
    }
    let (end_line, end_vcs_line) = end;
    if line > end_line || vcs_line > end_vcs_line {
        return Err(format!(
            "ranges exceed the region ending at {end_line}/{end_vcs_line}"
        ));
    }
    if end_line - line != end_vcs_line - vcs_line {
        return Err("unchanged trailing lines differ in length".to_string());
    }
    Ok(())
}

/// Line-set selection rule shared by lookups and partial rollback.
pub(crate) fn is_selected_by_line(range: &Range, line: usize) -> bool {
    if range.line1 == range.line2 {
        range.line1 == line
    } else {
        range.line1 <= line && line < range.line2
    }
}
