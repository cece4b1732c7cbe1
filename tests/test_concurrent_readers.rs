//! Query threads reading while the edit thread keeps changing the buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use sabun::{
    LineStatusTracker, LineText, Range, TextDocument, TrackerError, TrackerSettings, TrackerStatus,
};
use tokio_util::sync::CancellationToken;

fn tracker(working: &str, base: &str) -> LineStatusTracker<TextDocument> {
    let buffer = Arc::new(RwLock::new(TextDocument::new(working)));
    let tracker = LineStatusTracker::new(buffer, TrackerSettings::default());
    tracker.set_base_revision(base).unwrap();
    tracker
}

fn assert_sorted(ranges: &[Range]) {
    for pair in ranges.windows(2) {
        assert!(
            pair[0].line2 <= pair[1].line1 && pair[0].vcs_line2 <= pair[1].vcs_line1,
            "unsorted ranges: {:?}",
            ranges
        );
    }
}

#[test]
fn readers_always_see_sorted_ranges() {
    let base: String = (0..200).map(|i| format!("line {i}\n")).collect();
    let tracker = tracker(&base, &base);
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let reader = tracker.reader();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut reads = 0;
                while !done.load(Ordering::Relaxed) {
                    assert_sorted(&reader.ranges());
                    let _ = reader.is_line_modified(reads % 200);
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for step in 0..300 {
        let line = (step * 7) % 190;
        let span = {
            let buffer = tracker.buffer().read().unwrap();
            buffer.line_start(line)..buffer.line_end(line)
        };
        match step % 3 {
            0 => tracker.apply_edit(span, &format!("edited {step}")).unwrap(),
            1 => tracker.apply_edit(span.start..span.start, "new\n").unwrap(),
            _ => tracker.apply_edit(span.start..span.end + 1, "").unwrap(),
        };
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().unwrap();
    }

    let incremental = tracker.ranges();
    assert_sorted(&incremental);

    let working = tracker.buffer().read().unwrap().text().to_string();
    let fresh = self::tracker(&working, &base);
    assert_eq!(
        rebuild(&base, &working, &incremental),
        working,
        "incremental ranges no longer describe the buffer"
    );
    assert_eq!(rebuild(&base, &working, &fresh.ranges()), working);
}

/// Rebuild the working text from the base by replacing every range with the
/// working lines it covers.
fn rebuild(base: &str, working: &str, ranges: &[Range]) -> String {
    let base_lines: Vec<&str> = base.split('\n').collect();
    let working_lines: Vec<&str> = working.split('\n').collect();
    let mut out = Vec::new();
    let mut vcs_line = 0;
    for range in ranges {
        out.extend_from_slice(&base_lines[vcs_line..range.vcs_line1]);
        out.extend_from_slice(&working_lines[range.line1..range.line2]);
        vcs_line = range.vcs_line2;
    }
    out.extend_from_slice(&base_lines[vcs_line..]);
    out.join("\n")
}

#[test]
fn cancelled_read_leaves_tracker_dirty() {
    let tracker = tracker("a\nb\nc\n", "a\nb\nc\n");
    tracker.apply_edit(2..3, "X").unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(
        tracker.ranges_cancellable(&cancel),
        Err(TrackerError::Cancelled)
    ));
    assert_eq!(tracker.status(), TrackerStatus::Dirty);

    let ranges = tracker
        .ranges_cancellable(&CancellationToken::new())
        .unwrap();
    assert_eq!(ranges, vec![Range::new(1, 2, 1, 2)]);
    assert_eq!(tracker.status(), TrackerStatus::Valid);
}

#[test]
fn tracker_recovers_from_poisoned_buffer_lock() {
    let tracker = tracker("a\nb\n", "a\nb\n");
    let buffer = Arc::clone(tracker.buffer());

    let handle = thread::spawn(move || {
        let _guard = buffer.write().unwrap();
        panic!("Intentional panic to poison the buffer lock");
    });
    let _ = handle.join();
    assert!(tracker.buffer().is_poisoned());

    tracker.apply_edit(0..1, "A").unwrap();
    assert_eq!(tracker.ranges(), vec![Range::new(0, 1, 0, 1)]);
}

#[test]
fn reader_outlives_the_edit_handle() {
    let tracker = tracker("a\nX\n", "a\nb\n");
    let reader = tracker.reader();

    let handle = thread::spawn(move || reader.ranges());
    let seen = handle.join().unwrap();
    assert_eq!(seen, vec![Range::new(1, 2, 1, 2)]);

    let reader = tracker.reader();
    drop(tracker);
    assert_eq!(reader.status(), TrackerStatus::Released);
    assert!(reader.ranges().is_empty());
}
