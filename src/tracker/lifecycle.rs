use serde::Serialize;

/// Internal lifecycle of a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    /// No base text installed yet.
    Uninitialized,
    /// Ranges are maintained; a pending dirty window means `Dirty`.
    Tracking,
    /// The rollback engine is rewriting the working buffer; edit notifications are ignored.
    RollingBack,
    /// The diff engine refused the input; tracking is suspended until a new
    /// base revision or an explicit revalidation.
    TooBig,
    /// The host announced a batch of edits; tracking resumes with one full diff.
    BulkUpdate,
    /// Terminal.
    Released,
}

impl Lifecycle {
    /// Edit notifications only feed the dirty window while tracking.
    pub(crate) fn accepts_edits(self) -> bool {
        self == Lifecycle::Tracking
    }

    /// Whether the stored ranges describe the buffers.
    pub(crate) fn has_ranges(self) -> bool {
        matches!(self, Lifecycle::Tracking | Lifecycle::RollingBack)
    }

    pub(crate) fn status(self, dirty: bool) -> TrackerStatus {
        match self {
            Lifecycle::Uninitialized => TrackerStatus::Uninitialized,
            Lifecycle::Tracking if dirty => TrackerStatus::Dirty,
            Lifecycle::Tracking => TrackerStatus::Valid,
            Lifecycle::RollingBack => TrackerStatus::DuringRollback,
            Lifecycle::TooBig => TrackerStatus::TooBig,
            Lifecycle::BulkUpdate => TrackerStatus::BulkUpdate,
            Lifecycle::Released => TrackerStatus::Released,
        }
    }
}

/// Observable tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    Uninitialized,
    Valid,
    Dirty,
    TooBig,
    BulkUpdate,
    DuringRollback,
    Released,
}

/// Why a tracker stopped maintaining ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendReason {
    TooBig,
    BulkUpdate,
}
