//! Incremental tracking of the line ranges by which a working buffer differs
//! from a base revision.

pub mod config;
pub mod diff;
pub mod error;
pub mod range;
pub mod registry;
pub mod text;
pub mod tracker;

pub use config::TrackerSettings;
pub use diff::{DiffEngine, DiffError, SimilarDiffEngine};
pub use error::{LockResultExt, TrackerError, TrackerResult};
pub use range::{Range, RangeKind};
pub use registry::TrackerRegistry;
pub use text::{LineText, TextDocument, WorkingBuffer};
pub use tracker::{
    DirtyWindow, EditEvent, LineDirection, LineStatusTracker, NoopListener, SuspendReason,
    TrackerEvent, TrackerListener, TrackerReader, TrackerStatus,
};
