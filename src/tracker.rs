//! Line status tracking.
//!
//! A tracker keeps the ranges by which a host-owned working buffer differs
//! from a base revision. Edits only record a dirty window; the next
//! validating read re-diffs that window and splices the result into the
//! stored ranges.
//!
//! # Roles
//!
//! [`LineStatusTracker`] is the edit handle. It lives on the thread that owns
//! the edits and is the only way to mutate the tracker. It dereferences to a
//! [`TrackerReader`], which can be cloned and shared with query threads.
//!
//! # Locking
//!
//! The working buffer is shared as `Arc<RwLock<B>>`. Every operation that
//! needs both locks takes the buffer lock first and the tracker state second.
//! Validation keeps the buffer read-locked but releases the state lock while
//! the diff engine runs.
//!
//! Validating calls (`ranges`, `flush`, the line queries) read-lock the
//! buffer. A thread that holds the buffer's write guard must use
//! [`LineStatusTracker::finish_edit_batch`] and
//! [`TrackerReader::ranges_unvalidated`] instead.

mod events;
mod lifecycle;
mod rollback;
mod state;
pub(crate) mod store;
mod updater;
mod window;

pub use events::{NoopListener, TrackerEvent, TrackerListener};
pub use lifecycle::{SuspendReason, TrackerStatus};
pub use store::LineDirection;
pub use window::{DirtyWindow, EditEvent};

use std::collections::BTreeSet;
use std::ops::{Deref, Range as ByteRange};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use crate::config::TrackerSettings;
use crate::diff::{DiffEngine, SimilarDiffEngine};
use crate::error::{LockResultExt, TrackerError, TrackerResult};
use crate::range::Range;
use crate::text::{LineText, TextDocument, WorkingBuffer};
use lifecycle::Lifecycle;
use state::TrackerState;
use updater::CommitOutcome;

const LOG_TARGET: &str = "sabun::tracker";

struct Shared<B> {
    buffer: Arc<RwLock<B>>,
    state: Mutex<TrackerState>,
    engine: Arc<dyn DiffEngine>,
    listener: Arc<dyn TrackerListener>,
    settings: ArcSwap<TrackerSettings>,
}

impl<B: WorkingBuffer> Shared<B> {
    fn lock_state(&self, context: &str) -> MutexGuard<'_, TrackerState> {
        self.state.lock().recover_poison(context)
    }

    fn read_buffer(&self, context: &str) -> RwLockReadGuard<'_, B> {
        self.buffer.read().recover_poison(context)
    }

    fn write_buffer(&self, context: &str) -> RwLockWriteGuard<'_, B> {
        self.buffer.write().recover_poison(context)
    }

    fn dispatch(&self, events: Vec<TrackerEvent>) {
        if !events.is_empty() {
            events::dispatch(self.listener.as_ref(), events);
        }
    }

    /// Bring the ranges up to date with `doc`, which must be the (locked)
    /// working buffer.
    fn validate(&self, doc: &B, cancel: &CancellationToken) -> TrackerResult<()> {
        loop {
            let settings = self.settings.load_full();
            let plan = {
                let mut state = self.lock_state("validate.plan");
                match state.plan_update(doc, &settings) {
                    Ok(Some(plan)) => plan,
                    Ok(None) => return Ok(()),
                    Err(problem) => {
                        log::error!(
                            target: LOG_TARGET,
                            "Inconsistent dirty window, falling back to a full diff: {}",
                            problem
                        );
                        state.schedule_full_rediff();
                        continue;
                    }
                }
            };

            let result = plan.run(self.engine.as_ref(), &settings, cancel);

            let mut events = Vec::new();
            let outcome = self
                .lock_state("validate.commit")
                .commit(plan, result, doc, &mut events);
            self.dispatch(events);

            match outcome {
                CommitOutcome::Done => return Ok(()),
                CommitOutcome::Retry => continue,
                CommitOutcome::Cancelled => return Err(TrackerError::Cancelled),
                CommitOutcome::Suspended { lines, limit } => {
                    return Err(TrackerError::TooLargeForDiff { lines, limit });
                }
                CommitOutcome::Failed(message) => return Err(TrackerError::Internal(message)),
            }
        }
    }

    /// Validate for a query. Failures only leave the ranges as they are.
    fn validate_for_query(&self, doc: &B) {
        if let Err(err) = self.validate(doc, &CancellationToken::new()) {
            log::debug!(target: LOG_TARGET, "Query sees unvalidated ranges: {}", err);
        }
    }
}

/// Read access to a tracker, shareable across threads.
pub struct TrackerReader<B> {
    shared: Arc<Shared<B>>,
}

impl<B> Clone for TrackerReader<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B> std::fmt::Debug for TrackerReader<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerReader").finish_non_exhaustive()
    }
}

impl<B: WorkingBuffer> TrackerReader<B> {
    /// The working buffer this tracker follows.
    pub fn buffer(&self) -> &Arc<RwLock<B>> {
        &self.shared.buffer
    }

    pub fn status(&self) -> TrackerStatus {
        self.shared.lock_state("status").status()
    }

    pub fn settings(&self) -> Arc<TrackerSettings> {
        self.shared.settings.load_full()
    }

    /// Validate pending edits.
    pub fn flush(&self) -> TrackerResult<()> {
        self.flush_cancellable(&CancellationToken::new())
    }

    /// Validate pending edits, giving up when `cancel` fires. A cancelled
    /// validation leaves the tracker dirty.
    pub fn flush_cancellable(&self, cancel: &CancellationToken) -> TrackerResult<()> {
        let buffer = self.shared.read_buffer("flush");
        self.shared.lock_state("flush").ensure_not_released()?;
        self.shared.validate(&buffer, cancel)
    }

    /// The current ranges, validated first. Empty unless tracking.
    pub fn ranges(&self) -> Vec<Range> {
        self.with_validated_state(Vec::new(), |state| state.store.ranges().to_vec())
    }

    /// Like [`ranges`](Self::ranges), but cancellable and reporting failures.
    pub fn ranges_cancellable(&self, cancel: &CancellationToken) -> TrackerResult<Vec<Range>> {
        let buffer = self.shared.read_buffer("ranges_cancellable");
        self.shared.lock_state("ranges_cancellable").ensure_not_released()?;
        self.shared.validate(&buffer, cancel)?;
        Ok(self.ranges_unvalidated())
    }

    /// A copy of the stored ranges without validating pending edits. Safe to
    /// call while the buffer is write-locked.
    pub fn ranges_unvalidated(&self) -> Vec<Range> {
        let state = self.shared.lock_state("ranges_unvalidated");
        if state.lifecycle.has_ranges() {
            state.store.ranges().to_vec()
        } else {
            Vec::new()
        }
    }

    /// Lines the next validation will re-diff, if any.
    pub fn dirty_window(&self) -> Option<DirtyWindow> {
        self.shared.lock_state("dirty_window").accumulator.window()
    }

    /// The range covering `line` of the working buffer.
    pub fn range_for_line(&self, line: usize) -> Option<Range> {
        self.with_validated_state(None, |state| state.store.range_for_line(line))
    }

    pub fn is_line_modified(&self, line: usize) -> bool {
        self.with_validated_state(false, |state| state.store.is_line_modified(line))
    }

    /// Whether any range touches working lines `line1..line2`.
    pub fn is_range_modified(&self, line1: usize, line2: usize) -> bool {
        self.with_validated_state(false, |state| state.store.is_range_modified(line1, line2))
    }

    /// The first range starting after `line`.
    pub fn next_range(&self, line: usize) -> Option<Range> {
        self.with_validated_state(None, |state| state.store.next_range(line))
    }

    /// The last range before `line`, not counting the range covering it.
    pub fn prev_range(&self, line: usize) -> Option<Range> {
        self.with_validated_state(None, |state| state.store.prev_range(line))
    }

    /// Map `line` to the other buffer.
    ///
    /// Lines inside a range have no counterpart: with `approximate` the start
    /// of the range on the other side is returned, otherwise `None`. While no
    /// ranges are maintained (bulk update, suspended) lines map to themselves
    /// approximately.
    pub fn transfer_line(
        &self,
        line: usize,
        direction: LineDirection,
        approximate: bool,
    ) -> Option<usize> {
        let neutral = approximate.then_some(line);
        self.with_validated_state(neutral, |state| {
            state.store.transfer_line(line, direction, approximate)
        })
    }

    /// The base text a range replaces, without a trailing newline.
    pub fn base_content(&self, range: &Range) -> Option<String> {
        let state = self.shared.lock_state("base_content");
        if !state.lifecycle.has_ranges() || !state.store.contains(range) {
            return None;
        }
        Some(
            state
                .base
                .lines_text(range.vcs_line1, range.vcs_line2)
                .to_string(),
        )
    }

    fn with_validated_state<R>(&self, neutral: R, query: impl FnOnce(&TrackerState) -> R) -> R {
        let buffer = self.shared.read_buffer("query");
        self.shared.validate_for_query(&buffer);
        let state = self.shared.lock_state("query");
        if state.lifecycle.has_ranges() {
            query(&state)
        } else {
            if state.lifecycle == Lifecycle::Released {
                log::debug!(target: LOG_TARGET, "Query on a released tracker");
            }
            neutral
        }
    }
}

/// The edit handle of a tracker.
///
/// Dropping the handle releases the tracker; remaining readers then answer
/// every query with neutral results.
pub struct LineStatusTracker<B: WorkingBuffer> {
    reader: TrackerReader<B>,
}

impl<B: WorkingBuffer> Deref for LineStatusTracker<B> {
    type Target = TrackerReader<B>;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl<B: WorkingBuffer> std::fmt::Debug for LineStatusTracker<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStatusTracker")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<B: WorkingBuffer> Drop for LineStatusTracker<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: WorkingBuffer> LineStatusTracker<B> {
    /// Track `buffer` with the `similar`-backed diff engine and no listener.
    pub fn new(buffer: Arc<RwLock<B>>, settings: TrackerSettings) -> Self {
        Self::with_listener(buffer, settings, Arc::new(NoopListener))
    }

    pub fn with_listener(
        buffer: Arc<RwLock<B>>,
        settings: TrackerSettings,
        listener: Arc<dyn TrackerListener>,
    ) -> Self {
        // The line limit is enforced from the live settings instead.
        let engine = Arc::new(SimilarDiffEngine::new(usize::MAX));
        Self::with_components(buffer, settings, engine, listener)
    }

    pub fn with_components(
        buffer: Arc<RwLock<B>>,
        settings: TrackerSettings,
        engine: Arc<dyn DiffEngine>,
        listener: Arc<dyn TrackerListener>,
    ) -> Self {
        Self {
            reader: TrackerReader {
                shared: Arc::new(Shared {
                    buffer,
                    state: Mutex::new(TrackerState::new()),
                    engine,
                    listener,
                    settings: ArcSwap::from_pointee(settings),
                }),
            },
        }
    }

    /// A reader for query threads.
    pub fn reader(&self) -> TrackerReader<B> {
        self.reader.clone()
    }

    /// Install a new base revision and diff the buffers completely.
    pub fn set_base_revision(&self, text: impl Into<String>) -> TrackerResult<()> {
        let buffer = self.shared.read_buffer("set_base_revision");
        self.shared
            .lock_state("set_base_revision")
            .install_base(TextDocument::new(text))?;
        self.shared.validate(&buffer, &CancellationToken::new())
    }

    /// Must be called with the pre-edit buffer, before the edit is applied.
    pub fn before_change(&self, doc: &B, event: &EditEvent) {
        let mut state = self.shared.lock_state("before_change");
        if state.lifecycle.accepts_edits() {
            state.accumulator.before_change(doc, event);
        }
    }

    /// Must be called with the post-edit buffer, after the edit is applied.
    pub fn after_change(&self, doc: &B, event: &EditEvent) {
        let mut state = self.shared.lock_state("after_change");
        if !state.lifecycle.accepts_edits() {
            return;
        }
        if state.accumulator.after_change(doc, event) {
            state.touch();
        } else {
            log::warn!(
                target: LOG_TARGET,
                "Edit {:?} was reported without a matching before_change or outside the buffer",
                event
            );
            state.schedule_full_rediff();
        }
    }

    /// Replace `range` of the working buffer with `text` and report the edit.
    pub fn apply_edit(&self, range: ByteRange<usize>, text: &str) -> TrackerResult<EditEvent> {
        let mut buffer = self.shared.write_buffer("apply_edit");
        self.shared.lock_state("apply_edit").ensure_not_released()?;

        let len = buffer.text().len();
        let valid = range.start <= range.end
            && range.end <= len
            && buffer.text().is_char_boundary(range.start)
            && buffer.text().is_char_boundary(range.end);
        if !valid {
            return Err(TrackerError::InvalidEdit {
                start: range.start,
                end: range.end,
                len,
            });
        }

        let event = EditEvent::replace(range.clone(), text);
        self.before_change(&buffer, &event);
        buffer.replace_range(range, text);
        self.after_change(&buffer, &event);
        Ok(event)
    }

    /// Validate right away, for hosts that hold the buffer's write guard at
    /// the end of an edit batch.
    pub fn finish_edit_batch(&self, doc: &B) -> TrackerResult<()> {
        self.shared.lock_state("finish_edit_batch").ensure_not_released()?;
        self.shared.validate(doc, &CancellationToken::new())
    }

    /// Stop tracking until [`finish_bulk_update`](Self::finish_bulk_update).
    pub fn start_bulk_update(&self) -> TrackerResult<()> {
        let mut events = Vec::new();
        let result = self
            .shared
            .lock_state("start_bulk_update")
            .start_bulk_update(&mut events);
        self.shared.dispatch(events);
        result
    }

    /// Resume tracking with one full diff.
    pub fn finish_bulk_update(&self) -> TrackerResult<()> {
        let buffer = self.shared.read_buffer("finish_bulk_update");
        self.shared
            .lock_state("finish_bulk_update")
            .finish_bulk_update()?;
        self.shared.validate(&buffer, &CancellationToken::new())
    }

    /// Diff both buffers completely, leaving a too-big suspension if they fit
    /// the diff limit again.
    pub fn revalidate(&self) -> TrackerResult<()> {
        let buffer = self.shared.read_buffer("revalidate");
        self.shared
            .lock_state("revalidate")
            .request_revalidation()?;
        self.shared.validate(&buffer, &CancellationToken::new())
    }

    /// Revert `ranges` of the working buffer to the base text.
    ///
    /// Returns how many ranges were rolled back. If a range is no longer part
    /// of the tracker, the ranges before it stay rolled back and the rest are
    /// skipped with [`TrackerError::InvalidRange`].
    pub fn rollback(&self, ranges: &[Range]) -> TrackerResult<usize> {
        self.rollback_with(|state| state.plan_rollback(ranges))
    }

    /// Revert every range selected by a working line in `lines`. A deletion
    /// is selected by the line it sits before.
    pub fn rollback_lines(&self, lines: &BTreeSet<usize>) -> TrackerResult<usize> {
        self.rollback_with(|state| {
            let selected = state.ranges_selected_by_lines(lines);
            state.plan_rollback(&selected)
        })
    }

    fn rollback_with(
        &self,
        select: impl FnOnce(&TrackerState) -> rollback::RollbackPlan,
    ) -> TrackerResult<usize> {
        let mut buffer = self.shared.write_buffer("rollback");
        self.shared.lock_state("rollback").ensure_tracking()?;
        self.shared.validate(&buffer, &CancellationToken::new())?;

        let plan = {
            let mut state = self.shared.lock_state("rollback.plan");
            state.ensure_tracking()?;
            let plan = select(&state);
            state.lifecycle = Lifecycle::RollingBack;
            state.touch();
            plan
        };

        rollback::apply_rollback(&mut *buffer, &plan);

        let mut events = Vec::new();
        self.shared
            .lock_state("rollback.finish")
            .finish_rollback(&plan, &mut events);
        self.shared.dispatch(events);

        match plan.invalid {
            Some(range) => {
                log::warn!(
                    target: "sabun::rollback",
                    "Range {:?} is no longer valid; skipped it and the ranges after it",
                    range
                );
                Err(TrackerError::InvalidRange {
                    range,
                    applied: plan.len(),
                })
            }
            None => Ok(plan.len()),
        }
    }

    /// Swap the settings. Changing whitespace detection re-diffs everything.
    pub fn apply_settings(&self, settings: TrackerSettings) {
        let previous = self.shared.settings.swap(Arc::new(settings.clone()));
        if previous.detect_whitespace_changes != settings.detect_whitespace_changes {
            let mut state = self.shared.lock_state("apply_settings");
            if state.lifecycle == Lifecycle::Tracking {
                state.schedule_full_rediff();
            }
        }
    }

    /// Stop tracking for good and destroy every range. Idempotent.
    pub fn release(&self) {
        let mut events = Vec::new();
        let released = self.shared.lock_state("release").release(&mut events);
        if released {
            log::debug!(target: LOG_TARGET, "Tracker released");
            self.shared.dispatch(events);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(working: &str, base: &str) -> LineStatusTracker<TextDocument> {
        let buffer = Arc::new(RwLock::new(TextDocument::new(working)));
        let tracker = LineStatusTracker::new(buffer, TrackerSettings::default());
        tracker.set_base_revision(base).unwrap();
        tracker
    }

    #[test]
    fn test_set_base_revision_computes_ranges() {
        let tracker = tracker("a\nX\nc\n", "a\nb\nc\n");
        assert_eq!(tracker.status(), TrackerStatus::Valid);
        assert_eq!(tracker.ranges(), vec![Range::new(1, 2, 1, 2)]);
    }

    #[test]
    fn test_apply_edit_marks_dirty_until_read() {
        let tracker = tracker("a\nb\nc\n", "a\nb\nc\n");
        tracker.apply_edit(2..3, "X").unwrap();
        assert_eq!(tracker.status(), TrackerStatus::Dirty);
        assert!(tracker.ranges_unvalidated().is_empty());
        let window = tracker.dirty_window().unwrap();
        assert_eq!((window.line1, window.line2, window.line_shift), (1, 2, 0));

        assert_eq!(tracker.ranges(), vec![Range::new(1, 2, 1, 2)]);
        assert_eq!(tracker.status(), TrackerStatus::Valid);
        assert!(tracker.dirty_window().is_none());
    }

    #[test]
    fn test_apply_edit_rejects_out_of_bounds() {
        let tracker = tracker("ab", "ab");
        assert!(matches!(
            tracker.apply_edit(1..5, ""),
            Err(TrackerError::InvalidEdit { len: 2, .. })
        ));
    }

    #[test]
    fn test_after_change_without_before_change_forces_full_rediff() {
        let tracker = tracker("a\nb\n", "a\nb\n");
        {
            let mut buffer = tracker.buffer().write().unwrap();
            buffer.replace_range(0..1, "A");
            tracker.after_change(&buffer, &EditEvent::new(0, 1, 1));
        }
        assert_eq!(tracker.status(), TrackerStatus::Dirty);
        assert_eq!(tracker.ranges(), vec![Range::new(0, 1, 0, 1)]);
    }

    #[test]
    fn test_drop_releases_tracker_for_readers() {
        let tracker = tracker("a\nX\n", "a\nb\n");
        let reader = tracker.reader();
        drop(tracker);
        assert_eq!(reader.status(), TrackerStatus::Released);
        assert!(reader.ranges().is_empty());
        assert_eq!(reader.transfer_line(1, LineDirection::ToBase, true), Some(1));
        assert!(matches!(reader.flush(), Err(TrackerError::Released)));
    }

    #[test]
    fn test_whitespace_setting_change_rediffs() {
        let tracker = tracker("a\n  b\n", "a\nb\n");
        assert!(tracker.ranges()[0].whitespace_only);
        tracker.apply_settings(TrackerSettings {
            detect_whitespace_changes: false,
            ..TrackerSettings::default()
        });
        assert_eq!(tracker.status(), TrackerStatus::Dirty);
        assert!(!tracker.ranges()[0].whitespace_only);
    }
}
