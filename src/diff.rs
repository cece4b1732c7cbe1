//! Line diffing between two sequences of lines.
//!
//! The tracker only ever hands the engine bounded windows of both buffers
//! (except for the initial load and fallbacks), and treats it as a black box:
//! given working and base lines, produce the sorted, non-overlapping ranges in
//! which they differ.

use similar::Algorithm;
use similar::algorithms::DiffHook;
use std::ops::Range as LineSpan;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::range::Range;

/// Default limit on the total number of lines (both sides) handed to the engine.
pub const DEFAULT_MAX_DIFF_LINES: usize = 300_000;

/// Failure modes of a diff computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    /// The input exceeds the engine's size threshold.
    #[error("Too large to diff: {lines} lines exceed the limit of {limit}")]
    TooLarge { lines: usize, limit: usize },

    /// A cancellation token fired while diffing.
    #[error("Diff was cancelled")]
    Cancelled,

    /// Any other failure.
    #[error("Diff failed: {0}")]
    Failed(String),
}

/// Computes line ranges between a working and a base sequence of lines.
pub trait DiffEngine: Send + Sync {
    /// Returns ranges relative to the given slices (line 0 is the first element
    /// of each slice), sorted and non-overlapping on both sides.
    ///
    /// With `detect_whitespace_only_changes`, modifications whose two sides are
    /// equal once whitespace is removed are flagged `whitespace_only`.
    ///
    /// Implementations should check `cancel` cooperatively and return
    /// [`DiffError::Cancelled`] when it fires. [`SimilarDiffEngine`] checks it
    /// before diffing and on every hunk the algorithm reports.
    fn compute_ranges(
        &self,
        working: &[String],
        base: &[String],
        detect_whitespace_only_changes: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Range>, DiffError>;
}

/// Myers line diff backed by `similar`.
#[derive(Debug, Clone)]
pub struct SimilarDiffEngine {
    max_lines: usize,
    algorithm: Algorithm,
}

impl Default for SimilarDiffEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIFF_LINES)
    }
}

impl SimilarDiffEngine {
    /// Create an engine refusing inputs with more than `max_lines` lines in total.
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            algorithm: Algorithm::Myers,
        }
    }

    /// Use a different `similar` algorithm (e.g. patience).
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }
}

impl DiffEngine for SimilarDiffEngine {
    fn compute_ranges(
        &self,
        working: &[String],
        base: &[String],
        detect_whitespace_only_changes: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Range>, DiffError> {
        let lines = working.len() + base.len();
        if lines > self.max_lines {
            return Err(DiffError::TooLarge {
                lines,
                limit: self.max_lines,
            });
        }
        if cancel.is_cancelled() {
            return Err(DiffError::Cancelled);
        }

        // Common prefix and suffix never produce ranges; keep them out of Myers.
        let prefix = working
            .iter()
            .zip(base)
            .take_while(|(working, base)| working == base)
            .count();
        let suffix = working[prefix..]
            .iter()
            .rev()
            .zip(base[prefix..].iter().rev())
            .take_while(|(working, base)| working == base)
            .count();
        let working_core = &working[prefix..working.len() - suffix];
        let base_core = &base[prefix..base.len() - suffix];

        if working_core.is_empty() && base_core.is_empty() {
            return Ok(Vec::new());
        }
        // Raw algorithm output: the compaction pass of `capture_diff_slices`
        // may reorder hunks into overlapping ranges.
        let mut collector = RangeCollector::new(cancel);
        similar::algorithms::diff(
            self.algorithm,
            &mut collector,
            base_core,
            0..base_core.len(),
            working_core,
            0..working_core.len(),
        )?;
        let ranges = collector.into_ranges();

        Ok(ranges
            .into_iter()
            .map(|range| {
                let range = range.offset(prefix, prefix);
                if detect_whitespace_only_changes {
                    let whitespace_only = is_whitespace_only_change(
                        &working[range.line1..range.line2],
                        &base[range.vcs_line1..range.vcs_line2],
                    );
                    range.with_whitespace_only(whitespace_only)
                } else {
                    range
                }
            })
            .collect())
    }
}

/// Folds the hooks of a `similar` algorithm into ranges.
///
/// Runs of deletions and insertions with no equal lines between them form one
/// range. The token is checked on every hook call, so a long Myers run stops
/// at the next hunk it reports after cancellation.
struct RangeCollector<'a> {
    cancel: &'a CancellationToken,
    ranges: Vec<Range>,
    /// (base span, working span) of the run being collected
    pending: Option<(LineSpan<usize>, LineSpan<usize>)>,
}

impl<'a> RangeCollector<'a> {
    fn new(cancel: &'a CancellationToken) -> Self {
        Self {
            cancel,
            ranges: Vec::new(),
            pending: None,
        }
    }

    fn check_cancelled(&self) -> Result<(), DiffError> {
        if self.cancel.is_cancelled() {
            Err(DiffError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn change(&mut self, old: LineSpan<usize>, new: LineSpan<usize>) -> Result<(), DiffError> {
        self.check_cancelled()?;
        self.pending = Some(match self.pending.take() {
            Some((pending_old, pending_new))
                if pending_old.end == old.start && pending_new.end == new.start =>
            {
                (pending_old.start..old.end, pending_new.start..new.end)
            }
            Some((pending_old, pending_new)) => {
                self.ranges.push(build_range(pending_old, pending_new));
                (old, new)
            }
            None => (old, new),
        });
        Ok(())
    }

    fn flush(&mut self) {
        if let Some((old, new)) = self.pending.take() {
            self.ranges.push(build_range(old, new));
        }
    }

    fn into_ranges(mut self) -> Vec<Range> {
        self.flush();
        normalize(self.ranges)
    }
}

impl DiffHook for RangeCollector<'_> {
    type Error = DiffError;

    fn equal(&mut self, _old: usize, _new: usize, _len: usize) -> Result<(), DiffError> {
        self.check_cancelled()?;
        self.flush();
        Ok(())
    }

    fn delete(
        &mut self,
        old_index: usize,
        old_len: usize,
        new_index: usize,
    ) -> Result<(), DiffError> {
        self.change(old_index..old_index + old_len, new_index..new_index)
    }

    fn insert(
        &mut self,
        old_index: usize,
        new_index: usize,
        new_len: usize,
    ) -> Result<(), DiffError> {
        self.change(old_index..old_index, new_index..new_index + new_len)
    }

    fn finish(&mut self) -> Result<(), DiffError> {
        self.flush();
        Ok(())
    }
}

fn build_range(old: LineSpan<usize>, new: LineSpan<usize>) -> Range {
    Range::new(new.start, new.end, old.start, old.end)
}

/// Sort ranges and merge any that overlap or touch on either side.
fn normalize(mut ranges: Vec<Range>) -> Vec<Range> {
    ranges.sort_by_key(|range| (range.line1, range.vcs_line1));
    let mut merged: Vec<Range> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.line1 <= last.line2 || range.vcs_line1 <= last.vcs_line2 => {
                *last = Range::new(
                    last.line1.min(range.line1),
                    last.line2.max(range.line2),
                    last.vcs_line1.min(range.vcs_line1),
                    last.vcs_line2.max(range.vcs_line2),
                );
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Both sides are non-empty and equal once all whitespace is removed.
pub(crate) fn is_whitespace_only_change(working: &[String], base: &[String]) -> bool {
    if working.is_empty() || base.is_empty() {
        return false;
    }
    let squash = |lines: &[String]| -> String {
        lines
            .iter()
            .flat_map(|line| line.chars())
            .filter(|c| !c.is_whitespace())
            .collect()
    };
    squash(working) == squash(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::store::check_ranges;
    use proptest::prelude::*;

    fn lines(text: &str) -> Vec<String> {
        text.split('\n').map(String::from).collect()
    }

    fn diff(working: &str, base: &str) -> Vec<Range> {
        SimilarDiffEngine::default()
            .compute_ranges(
                &lines(working),
                &lines(base),
                true,
                &CancellationToken::new(),
            )
            .unwrap()
    }

    #[test]
    fn test_identical_input_has_no_ranges() {
        assert!(diff("a\nb\nc\n", "a\nb\nc\n").is_empty());
    }

    #[test]
    fn test_single_modified_line() {
        assert_eq!(diff("a\nX\nc\n", "a\nb\nc\n"), vec![Range::new(1, 2, 1, 2)]);
    }

    #[test]
    fn test_inserted_and_deleted_lines() {
        assert_eq!(diff("a\nb\ny\nc\n", "a\nb\nc\n"), vec![Range::new(2, 3, 2, 2)]);
        assert_eq!(diff("a\nc\n", "a\nb\nc\n"), vec![Range::new(1, 1, 1, 2)]);
    }

    #[test]
    fn test_separate_changes_stay_separate() {
        let ranges = diff("a\nX\nc\nd\nY\n", "a\nb\nc\nd\ne\n");
        assert_eq!(ranges, vec![Range::new(1, 2, 1, 2), Range::new(4, 5, 4, 5)]);
    }

    #[test]
    fn test_adjacent_delete_and_insert_merge_into_one_range() {
        let ranges = diff("a\nX\nY\nd\n", "a\nb\nd\n");
        assert_eq!(ranges, vec![Range::new(1, 3, 1, 2)]);
    }

    #[test]
    fn test_whitespace_only_modification_is_flagged() {
        let ranges = diff("fn main() {\n    x\n}", "fn main() {\n  x\n}");
        assert_eq!(ranges.len(), 1);
        assert!(ranges[0].whitespace_only);

        let ranges = SimilarDiffEngine::default()
            .compute_ranges(
                &lines("a\n  x"),
                &lines("a\nx"),
                false,
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(!ranges[0].whitespace_only);
    }

    #[test]
    fn test_too_large_input_is_rejected() {
        let engine = SimilarDiffEngine::new(4);
        let result = engine.compute_ranges(
            &lines("a\nb\nc"),
            &lines("a\nb"),
            false,
            &CancellationToken::new(),
        );
        assert_eq!(result, Err(DiffError::TooLarge { lines: 5, limit: 4 }));
    }

    #[test]
    fn test_cancelled_token_stops_the_diff() {
        let token = CancellationToken::new();
        token.cancel();
        let result =
            SimilarDiffEngine::default().compute_ranges(&lines("a"), &lines("b"), false, &token);
        assert_eq!(result, Err(DiffError::Cancelled));
    }

    #[test]
    fn test_empty_sides() {
        let engine = SimilarDiffEngine::default();
        let token = CancellationToken::new();
        let ranges = engine
            .compute_ranges(&lines("a\nb"), &[], false, &token)
            .unwrap();
        assert_eq!(ranges, vec![Range::new(0, 2, 0, 0)]);
        let ranges = engine
            .compute_ranges(&[], &lines("a"), false, &token)
            .unwrap();
        assert_eq!(ranges, vec![Range::new(0, 0, 0, 1)]);
    }

    /// Replace every range of `base` with the working lines it covers.
    fn rebuild(working: &[String], base: &[String], ranges: &[Range]) -> Vec<String> {
        let mut out = Vec::new();
        let mut vcs_line = 0;
        for range in ranges {
            out.extend_from_slice(&base[vcs_line..range.vcs_line1]);
            out.extend_from_slice(&working[range.line1..range.line2]);
            vcs_line = range.vcs_line2;
        }
        out.extend_from_slice(&base[vcs_line..]);
        out
    }

    fn assert_contract(working: &[String], base: &[String]) {
        let ranges = SimilarDiffEngine::default()
            .compute_ranges(working, base, true, &CancellationToken::new())
            .unwrap();
        assert_eq!(
            check_ranges(&ranges, (0, 0), (working.len(), base.len())),
            Ok(())
        );
        assert_eq!(rebuild(working, base, &ranges), working);
    }

    #[test]
    fn test_overlapping_ranges_are_merged() {
        let ranges = normalize(vec![Range::new(81, 81, 75, 77), Range::new(80, 82, 76, 76)]);
        assert_eq!(ranges, vec![Range::new(80, 82, 75, 77)]);
    }

    #[test]
    fn test_touching_ranges_are_merged_and_disjoint_ones_kept() {
        let ranges = normalize(vec![
            Range::new(9, 10, 9, 10),
            Range::new(2, 3, 2, 2),
            Range::new(3, 3, 2, 4),
        ]);
        assert_eq!(ranges, vec![Range::new(2, 3, 2, 4), Range::new(9, 10, 9, 10)]);
    }

    #[test]
    fn test_blank_line_insertions_in_repetitive_text_stay_ordered() {
        // Repeated lines leave many alignments of equal cost.
        let base: Vec<String> = (0..200)
            .map(|i| match i % 4 {
                0 => "}".to_string(),
                1 => String::new(),
                2 => "fn f() {".to_string(),
                _ => format!("    x{}", i % 3),
            })
            .collect();
        let mut working = base.clone();
        for (at, line) in [(150, ""), (120, "y"), (81, ""), (80, "z"), (77, ""), (20, "")] {
            working.insert(at, line.to_string());
        }
        working.remove(60);
        working.remove(59);
        assert_contract(&working, &base);
    }

    #[test]
    fn test_cancellation_interrupts_a_running_diff() {
        let token = CancellationToken::new();
        let mut collector = RangeCollector::new(&token);
        collector.delete(0, 1, 0).unwrap();
        token.cancel();
        assert_eq!(collector.insert(1, 0, 2), Err(DiffError::Cancelled));
        assert_eq!(collector.equal(1, 2, 1), Err(DiffError::Cancelled));

        let base = lines("a\nb\nc");
        let working = lines("a\nX\nc");
        let result = similar::algorithms::diff(
            Algorithm::Myers,
            &mut RangeCollector::new(&token),
            &base[..],
            0..base.len(),
            &working[..],
            0..working.len(),
        );
        assert_eq!(result, Err(DiffError::Cancelled));
    }

    #[test]
    fn test_patience_output_keeps_the_range_contract() {
        let base = lines("a\nb\nc\nb\nd\nb\ne");
        let working = lines("a\nb\nX\nb\nd\nb\nb\ne");
        let ranges = SimilarDiffEngine::default()
            .with_algorithm(Algorithm::Patience)
            .compute_ranges(&working, &base, false, &CancellationToken::new())
            .unwrap();
        assert_eq!(check_ranges(&ranges, (0, 0), (working.len(), base.len())), Ok(()));
        assert_eq!(rebuild(&working, &base, &ranges), working);
    }

    fn line_strategy() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["", "", "}", "{", "a", "b", "let x = 1;"])
            .prop_map(String::from)
    }

    fn edited_pair() -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
        (
            prop::collection::vec(line_strategy(), 100..300),
            prop::collection::vec(
                (any::<usize>(), 0usize..4, prop::collection::vec(line_strategy(), 0..4)),
                1..30,
            ),
        )
            .prop_map(|(base, edits)| {
                let mut working = base.clone();
                for (at, removed, inserted) in edits {
                    let start = at % (working.len() + 1);
                    let end = (start + removed).min(working.len());
                    working.splice(start..end, inserted);
                }
                (working, base)
            })
    }

    proptest! {
        #[test]
        fn prop_edited_lines_keep_the_range_contract((working, base) in edited_pair()) {
            let ranges = SimilarDiffEngine::default()
                .compute_ranges(&working, &base, true, &CancellationToken::new())
                .unwrap();
            prop_assert_eq!(check_ranges(&ranges, (0, 0), (working.len(), base.len())), Ok(()));
            prop_assert_eq!(rebuild(&working, &base, &ranges), working);
        }

        #[test]
        fn prop_unrelated_lines_keep_the_range_contract(
            working in prop::collection::vec(line_strategy(), 100..300),
            base in prop::collection::vec(line_strategy(), 100..300),
        ) {
            let ranges = SimilarDiffEngine::default()
                .compute_ranges(&working, &base, false, &CancellationToken::new())
                .unwrap();
            prop_assert_eq!(check_ranges(&ranges, (0, 0), (working.len(), base.len())), Ok(()));
            prop_assert_eq!(rebuild(&working, &base, &ranges), working);
        }
    }
}
