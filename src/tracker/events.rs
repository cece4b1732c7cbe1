//! Marker callbacks for the rendering collaborator.
//!
//! The tracker collects events while holding its state lock and hands them to
//! the listener only after the lock is released, so listeners may call back
//! into the tracker.

use tokio::sync::mpsc::UnboundedSender;

use super::lifecycle::SuspendReason;
use crate::range::Range;

/// Events emitted by a tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A range became part of the tracker; install its marker.
    RangeInstalled(Range),
    /// A range left the tracker; tear its marker down.
    RangeDestroyed(Range),
    /// Tracking stopped and all ranges were destroyed.
    TrackingSuspended(SuspendReason),
}

/// Receives marker installation and teardown requests.
///
/// Markers of ranges that are merely shifted by edits elsewhere are not
/// re-signalled; hosts are expected to anchor markers to the text.
pub trait TrackerListener: Send + Sync {
    fn range_installed(&self, _range: &Range) {}

    fn range_destroyed(&self, _range: &Range) {}

    fn tracking_suspended(&self, _reason: SuspendReason) {}
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl TrackerListener for NoopListener {}

/// Forward events to a channel consumed by the host.
impl TrackerListener for UnboundedSender<TrackerEvent> {
    fn range_installed(&self, range: &Range) {
        let _ = self.send(TrackerEvent::RangeInstalled(*range));
    }

    fn range_destroyed(&self, range: &Range) {
        let _ = self.send(TrackerEvent::RangeDestroyed(*range));
    }

    fn tracking_suspended(&self, reason: SuspendReason) {
        let _ = self.send(TrackerEvent::TrackingSuspended(reason));
    }
}

pub(crate) fn dispatch(listener: &dyn TrackerListener, events: Vec<TrackerEvent>) {
    for event in events {
        match event {
            TrackerEvent::RangeInstalled(range) => listener.range_installed(&range),
            TrackerEvent::RangeDestroyed(range) => listener.range_destroyed(&range),
            TrackerEvent::TrackingSuspended(reason) => listener.tracking_suspended(reason),
        }
    }
}

/// Record a replacement of `old` by `new`. Equal lists produce no marker churn.
pub(crate) fn push_replacement(events: &mut Vec<TrackerEvent>, old: &[Range], new: &[Range]) {
    if old == new {
        return;
    }
    events.extend(old.iter().copied().map(TrackerEvent::RangeDestroyed));
    events.extend(new.iter().copied().map(TrackerEvent::RangeInstalled));
}
