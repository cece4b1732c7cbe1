//! Error handling types for sabun
//!
//! Failures inside the update path are converted into lifecycle transitions
//! and never reach callers. The variants below are what remains visible.

use std::sync::PoisonError;
use thiserror::Error;

use crate::range::Range;
use crate::tracker::TrackerStatus;

/// Error type for tracker operations
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The tracker was released; it accepts no further work
    #[error("Tracker has been released")]
    Released,

    /// The operation needs an active tracker (base text installed, not suspended)
    #[error("Tracker is not tracking changes (status: {status:?})")]
    NotTracking { status: TrackerStatus },

    /// The buffers exceed the diff engine's size limit
    #[error("Too large to diff: {lines} lines exceed the limit of {limit}")]
    TooLargeForDiff { lines: usize, limit: usize },

    /// A cooperative cancellation interrupted validation; the tracker stays dirty
    #[error("Validation was cancelled")]
    Cancelled,

    /// A rollback reached a range that is no longer part of the tracker
    #[error("Range {range:?} is no longer valid ({applied} ranges were rolled back before it)")]
    InvalidRange { range: Range, applied: usize },

    /// An edit addressed bytes outside the buffer or split a character
    #[error("Invalid edit {start}..{end} for a buffer of {len} bytes")]
    InvalidEdit { start: usize, end: usize, len: usize },

    /// Configuration error
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Helper trait to recover the guard from a poisoned lock.
pub trait LockResultExt<T> {
    /// Take the guard even if another thread panicked while holding the lock.
    ///
    /// The context parameter identifies which operation triggered lock recovery,
    /// helping developers debug thread safety issues.
    fn recover_poison(self, context: &str) -> T;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    target: "sabun::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                poisoned.into_inner()
            }
        }
    }
}

/// Helper functions for common error patterns
impl TrackerError {
    /// Create a not-tracking error
    pub fn not_tracking(status: TrackerStatus) -> Self {
        TrackerError::NotTracking { status }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        TrackerError::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        TrackerError::Internal(message.into())
    }
}
