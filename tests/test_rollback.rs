use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use rstest::rstest;
use sabun::{LineStatusTracker, LineText, Range, TextDocument, TrackerError, TrackerSettings};

fn tracker(working: &str, base: &str) -> LineStatusTracker<TextDocument> {
    let buffer = Arc::new(RwLock::new(TextDocument::new(working)));
    let tracker = LineStatusTracker::new(buffer, TrackerSettings::default());
    tracker.set_base_revision(base).unwrap();
    tracker
}

fn working_text(tracker: &LineStatusTracker<TextDocument>) -> String {
    tracker.buffer().read().unwrap().text().to_string()
}

fn lines(lines: &[usize]) -> BTreeSet<usize> {
    lines.iter().copied().collect()
}

#[test]
fn rolling_back_every_range_restores_the_base() {
    let base = "a\nb\nc\nd";
    let tracker = tracker("x\na\nB\nc\nY", base);
    let ranges = tracker.ranges();
    assert_eq!(
        ranges,
        vec![
            Range::new(0, 1, 0, 0),
            Range::new(2, 3, 1, 2),
            Range::new(4, 5, 3, 4),
        ]
    );

    assert_eq!(tracker.rollback(&ranges).unwrap(), 3);
    assert_eq!(working_text(&tracker), base);
    assert!(tracker.ranges().is_empty());
}

#[test]
fn stale_range_aborts_the_remaining_rollbacks() {
    let tracker = tracker("x\na\nB\nc", "a\nb\nc");
    let ranges = tracker.ranges();
    assert_eq!(ranges.len(), 2);

    let stale = Range::new(1, 2, 9, 10);
    let result = tracker.rollback(&[ranges[0], stale, ranges[1]]);
    match result {
        Err(TrackerError::InvalidRange { range, applied }) => {
            assert_eq!(range, stale);
            assert_eq!(applied, 1);
        }
        other => panic!("expected InvalidRange, got {:?}", other),
    }
    assert_eq!(working_text(&tracker), "a\nB\nc");
    assert_eq!(tracker.ranges(), vec![Range::new(1, 2, 1, 2)]);
}

#[test]
fn line_selection_picks_deletions_by_their_line() {
    let tracker = tracker("a\nc\n", "a\nb\nc\n");
    assert_eq!(tracker.ranges(), vec![Range::new(1, 1, 1, 2)]);

    assert_eq!(tracker.rollback_lines(&lines(&[0])).unwrap(), 0);
    assert_eq!(working_text(&tracker), "a\nc\n");

    assert_eq!(tracker.rollback_lines(&lines(&[1])).unwrap(), 1);
    assert_eq!(working_text(&tracker), "a\nb\nc\n");
}

#[test]
fn partial_rollback_keeps_tracking_later_edits() {
    let tracker = tracker("a\nX\nc\nY\ne\n", "a\nb\nc\nd\ne\n");
    assert_eq!(tracker.rollback_lines(&lines(&[3])).unwrap(), 1);
    assert_eq!(tracker.ranges(), vec![Range::new(1, 2, 1, 2)]);

    tracker.apply_edit(0..0, "new\n").unwrap();
    assert_eq!(working_text(&tracker), "new\na\nX\nc\nd\ne\n");
    assert_eq!(
        tracker.ranges(),
        vec![Range::new(0, 1, 0, 0), Range::new(2, 3, 1, 2)]
    );
}

#[rstest]
#[case::deleted_last_line_without_newline("a", "a\nb")]
#[case::inserted_last_line_without_newline("a\nb", "a")]
#[case::inserted_first_line("b\na\n", "a\n")]
#[case::deleted_first_line("b\n", "a\nb\n")]
#[case::everything_replaced("x\ny", "a\nb\nc")]
#[case::emptied_buffer("", "a\nb\n")]
#[case::filled_empty_base("a\nb\n", "")]
fn test_rollback_lines_at_buffer_edges(#[case] working: &str, #[case] base: &str) {
    let tracker = tracker(working, base);
    let line_count = tracker.buffer().read().unwrap().line_count();
    let all: BTreeSet<usize> = (0..=line_count).collect();

    tracker.rollback_lines(&all).unwrap();

    assert_eq!(working_text(&tracker), base);
    assert!(tracker.ranges().is_empty());
}

#[test]
fn rollback_requires_tracking() {
    let tracker = tracker("a\nX\n", "a\nb\n");
    tracker.start_bulk_update().unwrap();
    assert!(matches!(
        tracker.rollback_lines(&lines(&[1])),
        Err(TrackerError::NotTracking { .. })
    ));
    assert_eq!(working_text(&tracker), "a\nX\n");
}
