use super::events::TrackerEvent;
use super::lifecycle::{Lifecycle, SuspendReason, TrackerStatus};
use super::store::RangeStore;
use super::window::DirtyWindowAccumulator;
use crate::error::{TrackerError, TrackerResult};
use crate::text::{LineText, TextDocument};

const LOG_TARGET: &str = "sabun::tracker";

/// Everything guarded by the tracker's state lock.
#[derive(Debug)]
pub(crate) struct TrackerState {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) base: TextDocument,
    pub(crate) store: RangeStore,
    pub(crate) accumulator: DirtyWindowAccumulator,
    /// Bumped by every mutation; a diff planned at an older generation is stale.
    pub(crate) generation: u64,
    pub(crate) needs_full_rediff: bool,
}

impl TrackerState {
    pub(crate) fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Uninitialized,
            base: TextDocument::default(),
            store: RangeStore::default(),
            accumulator: DirtyWindowAccumulator::default(),
            generation: 0,
            needs_full_rediff: false,
        }
    }

    pub(crate) fn status(&self) -> TrackerStatus {
        self.lifecycle
            .status(self.needs_full_rediff || self.accumulator.is_dirty())
    }

    pub(crate) fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub(crate) fn ensure_not_released(&self) -> TrackerResult<()> {
        match self.lifecycle {
            Lifecycle::Released => Err(TrackerError::Released),
            _ => Ok(()),
        }
    }

    pub(crate) fn ensure_tracking(&self) -> TrackerResult<()> {
        match self.lifecycle {
            Lifecycle::Tracking => Ok(()),
            Lifecycle::Released => Err(TrackerError::Released),
            _ => Err(TrackerError::not_tracking(self.status())),
        }
    }

    /// Forget the window and diff both buffers completely next time.
    pub(crate) fn schedule_full_rediff(&mut self) {
        self.needs_full_rediff = true;
        self.accumulator.clear_window();
        self.touch();
    }

    /// Install a new base text. During a bulk update the full diff waits for
    /// the update to finish.
    pub(crate) fn install_base(&mut self, base: TextDocument) -> TrackerResult<()> {
        match self.lifecycle {
            Lifecycle::Released => return Err(TrackerError::Released),
            Lifecycle::RollingBack => return Err(TrackerError::not_tracking(self.status())),
            Lifecycle::BulkUpdate => {}
            Lifecycle::Uninitialized | Lifecycle::Tracking | Lifecycle::TooBig => {
                self.lifecycle = Lifecycle::Tracking;
            }
        }
        log::debug!(
            target: LOG_TARGET,
            "Installing base revision with {} lines",
            base.line_count()
        );
        self.base = base;
        self.accumulator.clear();
        self.schedule_full_rediff();
        Ok(())
    }

    /// Drop every range and stop tracking.
    pub(crate) fn suspend(
        &mut self,
        lifecycle: Lifecycle,
        reason: SuspendReason,
        events: &mut Vec<TrackerEvent>,
    ) {
        self.destroy_ranges(events);
        self.accumulator.clear();
        self.needs_full_rediff = false;
        self.lifecycle = lifecycle;
        self.touch();
        events.push(TrackerEvent::TrackingSuspended(reason));
    }

    pub(crate) fn start_bulk_update(&mut self, events: &mut Vec<TrackerEvent>) -> TrackerResult<()> {
        match self.lifecycle {
            Lifecycle::Tracking | Lifecycle::TooBig => {
                self.suspend(Lifecycle::BulkUpdate, SuspendReason::BulkUpdate, events);
                Ok(())
            }
            Lifecycle::BulkUpdate => Ok(()),
            _ => self.ensure_tracking(),
        }
    }

    pub(crate) fn finish_bulk_update(&mut self) -> TrackerResult<()> {
        match self.lifecycle {
            Lifecycle::BulkUpdate => {
                self.lifecycle = Lifecycle::Tracking;
                self.schedule_full_rediff();
                Ok(())
            }
            Lifecycle::Released => Err(TrackerError::Released),
            _ => Err(TrackerError::not_tracking(self.status())),
        }
    }

    /// Explicit revalidation: leave `TooBig` and diff everything again.
    pub(crate) fn request_revalidation(&mut self) -> TrackerResult<()> {
        match self.lifecycle {
            Lifecycle::Tracking | Lifecycle::TooBig => {
                self.lifecycle = Lifecycle::Tracking;
                self.schedule_full_rediff();
                Ok(())
            }
            _ => self.ensure_tracking(),
        }
    }

    /// Returns `false` if the tracker was already released.
    pub(crate) fn release(&mut self, events: &mut Vec<TrackerEvent>) -> bool {
        if self.lifecycle == Lifecycle::Released {
            return false;
        }
        self.destroy_ranges(events);
        self.accumulator.clear();
        self.needs_full_rediff = false;
        self.base = TextDocument::default();
        self.lifecycle = Lifecycle::Released;
        self.touch();
        true
    }

    fn destroy_ranges(&mut self, events: &mut Vec<TrackerEvent>) {
        events.extend(
            self.store
                .clear()
                .into_iter()
                .map(TrackerEvent::RangeDestroyed),
        );
    }
}
