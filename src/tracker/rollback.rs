//! Reverting ranges of the working buffer to the base text.

use std::collections::BTreeSet;

use super::events::TrackerEvent;
use super::lifecycle::Lifecycle;
use super::state::TrackerState;
use crate::range::Range;
use crate::text::{LineText, WorkingBuffer};

const LOG_TARGET: &str = "sabun::rollback";

#[derive(Debug)]
struct RollbackStep {
    range: Range,
    base_text: String,
}

/// Ranges to revert in ascending order, with the base text each one is
/// replaced by. Resolved under the state lock, applied without it.
#[derive(Debug)]
pub(crate) struct RollbackPlan {
    steps: Vec<RollbackStep>,
    /// First requested range that is no longer tracked; it and every later
    /// request are skipped.
    pub(crate) invalid: Option<Range>,
}

impl RollbackPlan {
    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    fn ranges(&self) -> Vec<Range> {
        self.steps.iter().map(|step| step.range).collect()
    }
}

impl TrackerState {
    /// A range is selected when one of `lines` falls inside it; a deletion is
    /// selected by the line it sits before.
    pub(crate) fn ranges_selected_by_lines(&self, lines: &BTreeSet<usize>) -> Vec<Range> {
        self.store
            .ranges()
            .iter()
            .filter(|range| {
                if range.line1 == range.line2 {
                    lines.contains(&range.line1)
                } else {
                    lines.range(range.line1..range.line2).next().is_some()
                }
            })
            .copied()
            .collect()
    }

    pub(crate) fn plan_rollback(&self, requested: &[Range]) -> RollbackPlan {
        let mut requested = requested.to_vec();
        requested.sort_by_key(|range| (range.line1, range.line2, range.vcs_line1));
        requested.dedup();

        let mut steps = Vec::with_capacity(requested.len());
        let mut invalid = None;
        for range in requested {
            if !self.store.contains(&range) {
                invalid = Some(range);
                break;
            }
            steps.push(RollbackStep {
                range,
                base_text: self
                    .base
                    .lines_text(range.vcs_line1, range.vcs_line2)
                    .to_string(),
            });
        }
        RollbackPlan { steps, invalid }
    }

    /// Remove the reverted ranges and shift the remaining ones.
    pub(crate) fn finish_rollback(&mut self, plan: &RollbackPlan, events: &mut Vec<TrackerEvent>) {
        let removed = self.store.remove_rolled_back(&plan.ranges());
        events.extend(removed.into_iter().map(TrackerEvent::RangeDestroyed));
        if self.lifecycle == Lifecycle::RollingBack {
            self.lifecycle = Lifecycle::Tracking;
        }
        self.touch();
    }
}

/// Rewrite `buffer` so every planned range shows its base text again.
pub(crate) fn apply_rollback<B: WorkingBuffer + ?Sized>(buffer: &mut B, plan: &RollbackPlan) {
    let mut shift = 0isize;
    for step in &plan.steps {
        let range = step.range.shifted(shift);
        log::debug!(target: LOG_TARGET, "Rolling back {:?}", range);
        replace_lines(buffer, &range, &step.base_text);
        shift += step.range.rollback_delta();
    }
}

fn replace_lines<B: WorkingBuffer + ?Sized>(buffer: &mut B, range: &Range, base_text: &str) {
    match (range.line1 == range.line2, range.vcs_line1 == range.vcs_line2) {
        (true, true) => {}
        (true, false) => insert_lines(buffer, range.line1, base_text),
        (false, true) => delete_lines(buffer, range.line1, range.line2),
        (false, false) => {
            if let Some(span) = buffer.lines_span(range.line1, range.line2) {
                buffer.replace_range(span, base_text);
            }
        }
    }
}

fn insert_lines<B: WorkingBuffer + ?Sized>(buffer: &mut B, line: usize, text: &str) {
    if line >= buffer.line_count() {
        let end = buffer.text().len();
        buffer.replace_range(end..end, &format!("\n{text}"));
    } else {
        let start = buffer.line_start(line);
        buffer.replace_range(start..start, &format!("{text}\n"));
    }
}

fn delete_lines<B: WorkingBuffer + ?Sized>(buffer: &mut B, line1: usize, line2: usize) {
    let Some(span) = buffer.lines_span(line1, line2) else {
        return;
    };
    let (mut start, mut end) = (span.start, span.end);
    // Take one adjacent newline with the lines.
    if start > 0 {
        start -= 1;
    } else if end < buffer.text().len() {
        end += 1;
    }
    buffer.replace_range(start..end, "");
}
