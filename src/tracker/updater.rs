//! Incremental range maintenance.
//!
//! Validation is split in three steps so the diff engine never runs under the
//! state lock: [`TrackerState::plan_update`] slices the dirty region out of
//! both buffers, [`UpdatePlan::run`] diffs it, and [`TrackerState::commit`]
//! splices the result back if nothing changed in between.

use tokio_util::sync::CancellationToken;

use super::events::{TrackerEvent, push_replacement};
use super::lifecycle::{Lifecycle, SuspendReason};
use super::state::TrackerState;
use super::store::{Partition, check_ranges};
use crate::config::TrackerSettings;
use crate::diff::{DiffEngine, DiffError};
use crate::range::Range;
use crate::text::LineText;

const LOG_TARGET: &str = "sabun::tracker";

/// Lines to diff, captured under the state lock.
#[derive(Debug)]
pub(crate) struct UpdatePlan {
    generation: u64,
    scope: Scope,
    working: Vec<String>,
    base: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum Scope {
    /// Both buffers in full.
    Full,
    /// The dirty region starting at `line` / `vcs_line`, replacing the changed
    /// ranges of `partition`.
    Window {
        partition: Partition,
        line_shift: isize,
        line: usize,
        vcs_line: usize,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CommitOutcome {
    Done,
    /// The state moved while diffing, or the result was unusable; plan again.
    Retry,
    Cancelled,
    Suspended { lines: usize, limit: usize },
    Failed(String),
}

impl UpdatePlan {
    pub(crate) fn is_full(&self) -> bool {
        matches!(self.scope, Scope::Full)
    }

    pub(crate) fn run(
        &self,
        engine: &dyn DiffEngine,
        settings: &TrackerSettings,
        cancel: &CancellationToken,
    ) -> Result<Vec<Range>, DiffError> {
        let lines = self.working.len() + self.base.len();
        if lines > settings.max_diff_lines {
            return Err(DiffError::TooLarge {
                lines,
                limit: settings.max_diff_lines,
            });
        }

        match self.scope {
            Scope::Window { line, vcs_line, .. }
                if self.working.is_empty() || self.base.is_empty() =>
            {
                // One side is empty: no diff needed.
                if self.working.is_empty() && self.base.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![Range::new(
                    line,
                    line + self.working.len(),
                    vcs_line,
                    vcs_line + self.base.len(),
                )])
            }
            Scope::Window { line, vcs_line, .. } => engine
                .compute_ranges(
                    &self.working,
                    &self.base,
                    settings.detect_whitespace_changes,
                    cancel,
                )
                .map(|ranges| {
                    ranges
                        .into_iter()
                        .map(|range| range.offset(line, vcs_line))
                        .collect()
                }),
            Scope::Full => engine.compute_ranges(
                &self.working,
                &self.base,
                settings.detect_whitespace_changes,
                cancel,
            ),
        }
    }
}

impl TrackerState {
    /// Capture what the next validation has to diff. `Ok(None)` means the
    /// ranges are up to date (or not maintained in the current lifecycle).
    ///
    /// An `Err` reports bookkeeping that does not add up; the caller falls
    /// back to a full re-diff.
    pub(crate) fn plan_update<T: LineText + ?Sized>(
        &self,
        doc: &T,
        settings: &TrackerSettings,
    ) -> Result<Option<UpdatePlan>, String> {
        if self.lifecycle != Lifecycle::Tracking {
            return Ok(None);
        }

        if self.needs_full_rediff {
            return Ok(Some(UpdatePlan {
                generation: self.generation,
                scope: Scope::Full,
                working: doc.lines(0, doc.line_count()),
                base: self.base.lines(0, self.base.line_count()),
            }));
        }

        let Some(window) = self.accumulator.window() else {
            return Ok(None);
        };

        let partition = self.store.partition(
            doc,
            window.line1,
            window.line2,
            window.line_shift,
            settings.merge_whitespace_separated,
        );
        let changed = self.store.changed(partition);
        let line1 = changed
            .first()
            .map_or(window.line1, |range| range.line1.min(window.line1));
        let line2 = changed
            .last()
            .map_or(window.line2, |range| range.line2.max(window.line2));

        let current_line2 = usize::try_from(line2 as isize + window.line_shift)
            .map_err(|_| format!("{window:?} ends before the first line"))?;

        let vcs_line1 = match self.store.last_before(partition) {
            Some(before) => line1
                .checked_sub(before.line2)
                .map(|gap| before.vcs_line2 + gap),
            None => Some(line1),
        }
        .ok_or_else(|| format!("{window:?} starts inside a preceding range"))?;

        let vcs_line2 = match self.store.first_after(partition) {
            Some(after) => after
                .line1
                .checked_sub(line2)
                .and_then(|gap| after.vcs_line1.checked_sub(gap)),
            None => window
                .total_lines_before
                .checked_sub(line2)
                .and_then(|gap| self.base.line_count().checked_sub(gap)),
        }
        .ok_or_else(|| format!("{window:?} ends inside a following range"))?;

        if line1 > current_line2
            || current_line2 > doc.line_count()
            || vcs_line1 > vcs_line2
            || vcs_line2 > self.base.line_count()
        {
            return Err(format!(
                "dirty region {line1}..{current_line2} / {vcs_line1}..{vcs_line2} \
                 exceeds buffers of {}/{} lines",
                doc.line_count(),
                self.base.line_count()
            ));
        }

        Ok(Some(UpdatePlan {
            generation: self.generation,
            scope: Scope::Window {
                partition,
                line_shift: window.line_shift,
                line: line1,
                vcs_line: vcs_line1,
            },
            working: doc.lines(line1, current_line2),
            base: self.base.lines(vcs_line1, vcs_line2),
        }))
    }

    /// Install the result of `plan`. Marker events are appended to `events`.
    pub(crate) fn commit<T: LineText + ?Sized>(
        &mut self,
        plan: UpdatePlan,
        result: Result<Vec<Range>, DiffError>,
        doc: &T,
        events: &mut Vec<TrackerEvent>,
    ) -> CommitOutcome {
        if plan.generation != self.generation || self.lifecycle != Lifecycle::Tracking {
            log::trace!(target: LOG_TARGET, "Discarding stale diff result");
            return CommitOutcome::Retry;
        }

        let ranges = match result {
            Ok(ranges) => ranges,
            Err(DiffError::Cancelled) => return CommitOutcome::Cancelled,
            Err(DiffError::TooLarge { lines, limit }) => {
                log::info!(
                    target: LOG_TARGET,
                    "Suspending tracking: {} lines exceed the diff limit of {}",
                    lines,
                    limit
                );
                self.suspend(Lifecycle::TooBig, SuspendReason::TooBig, events);
                return CommitOutcome::Suspended { lines, limit };
            }
            Err(DiffError::Failed(message)) => {
                return self.fail(&plan, message, events);
            }
        };

        match plan.scope {
            Scope::Full => {
                let working_lines = doc.line_count();
                let base_lines = self.base.line_count();
                if let Err(problem) = check_ranges(&ranges, (0, 0), (working_lines, base_lines)) {
                    return self.fail(&plan, problem, events);
                }
                log::debug!(
                    target: LOG_TARGET,
                    "Full diff produced {} ranges",
                    ranges.len()
                );
                let old = self.store.replace_all(ranges.clone());
                push_replacement(events, &old, &ranges);
                self.needs_full_rediff = false;
                self.accumulator.clear_window();
                self.touch();
                CommitOutcome::Done
            }
            Scope::Window {
                partition,
                line_shift,
                line,
                vcs_line,
            } => {
                let end = (line + plan.working.len(), vcs_line + plan.base.len());
                if let Err(problem) = check_ranges(&ranges, (line, vcs_line), end) {
                    return self.fail(&plan, problem, events);
                }
                let old = self.store.splice(partition, ranges.clone(), line_shift);
                push_replacement(events, &old, &ranges);
                self.accumulator.clear_window();
                self.touch();

                if let Err(problem) = self.store.check(doc.line_count(), self.base.line_count()) {
                    log::error!(
                        target: LOG_TARGET,
                        "Inconsistent ranges after incremental update: {}",
                        problem
                    );
                    self.schedule_full_rediff();
                    return CommitOutcome::Retry;
                }
                CommitOutcome::Done
            }
        }
    }

    /// A failed windowed diff falls back to a full one; a failed full diff
    /// suspends tracking.
    fn fail(
        &mut self,
        plan: &UpdatePlan,
        message: String,
        events: &mut Vec<TrackerEvent>,
    ) -> CommitOutcome {
        if plan.is_full() {
            log::error!(
                target: LOG_TARGET,
                "Full diff failed, suspending tracking: {}",
                message
            );
            self.suspend(Lifecycle::TooBig, SuspendReason::TooBig, events);
            CommitOutcome::Failed(message)
        } else {
            log::error!(
                target: LOG_TARGET,
                "Incremental diff failed, falling back to a full diff: {}",
                message
            );
            self.schedule_full_rediff();
            CommitOutcome::Retry
        }
    }
}
