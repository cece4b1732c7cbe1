//! Trackers by document URI, with debounced background validation.
//!
//! Query threads look up a document's [`TrackerReader`] here. Edit threads call
//! [`TrackerRegistry::schedule_validation`] after each edit batch; the
//! validation runs once the document has been quiet for the debounce duration,
//! on tokio's blocking pool so the diff never stalls the runtime.
//!
//! ```text
//! edit batch
//!       │
//!       ▼
//! schedule_validation()
//!       │
//!       ├─► Abort the previous timer and cancel its validation
//!       │
//!       └─► Spawn a new timer task
//!               │
//!               ├─► Wait for the debounce duration
//!               │
//!               └─► spawn_blocking(reader.flush_cancellable)
//! ```

use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::TrackerSettings;
use crate::text::WorkingBuffer;
use crate::tracker::TrackerReader;

/// Logging target for the registry.
const LOG_TARGET: &str = "sabun::registry";

/// Finished timers are pruned once this many are registered.
const CLEANUP_THRESHOLD: usize = 32;

struct PendingValidation {
    timer: AbortHandle,
    cancel: CancellationToken,
}

impl PendingValidation {
    fn abort(self) {
        self.timer.abort();
        self.cancel.cancel();
    }
}

/// Registry of trackers keyed by document URI.
///
/// Uses `DashMap` so lookups from many threads do not contend on one lock.
pub struct TrackerRegistry<B> {
    trackers: DashMap<Url, TrackerReader<B>>,
    active_timers: DashMap<Url, PendingValidation>,
    debounce_duration: Duration,
}

impl<B: WorkingBuffer + Send + Sync + 'static> Default for TrackerRegistry<B> {
    fn default() -> Self {
        Self::new(&TrackerSettings::default())
    }
}

impl<B: WorkingBuffer + Send + Sync + 'static> TrackerRegistry<B> {
    /// Create a registry debouncing by `settings.validation_delay_ms`.
    pub fn new(settings: &TrackerSettings) -> Self {
        Self::with_duration(Duration::from_millis(settings.validation_delay_ms))
    }

    pub fn with_duration(debounce_duration: Duration) -> Self {
        Self {
            trackers: DashMap::new(),
            active_timers: DashMap::new(),
            debounce_duration,
        }
    }

    /// Register the tracker of `uri`, returning the one it replaces.
    pub fn register(&self, uri: Url, reader: TrackerReader<B>) -> Option<TrackerReader<B>> {
        log::debug!(target: LOG_TARGET, "Registering tracker for {}", uri);
        self.cancel_validation(&uri);
        self.trackers.insert(uri, reader)
    }

    pub fn get(&self, uri: &Url) -> Option<TrackerReader<B>> {
        self.trackers.get(uri).map(|entry| entry.value().clone())
    }

    /// Forget the tracker of `uri` and cancel its pending validation.
    pub fn remove(&self, uri: &Url) -> Option<TrackerReader<B>> {
        self.cancel_validation(uri);
        self.trackers.remove(uri).map(|(_, reader)| reader)
    }

    pub fn uris(&self) -> Vec<Url> {
        self.trackers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Validate the tracker of `uri` once no further call arrives within the
    /// debounce duration. Must be called from within a tokio runtime.
    ///
    /// Returns `false` if no tracker is registered for `uri`.
    pub fn schedule_validation(&self, uri: &Url) -> bool {
        let Some(reader) = self.get(uri) else {
            return false;
        };

        if self.active_timers.len() > CLEANUP_THRESHOLD {
            self.active_timers
                .retain(|_, pending| !pending.timer.is_finished());
        }

        self.cancel_validation(uri);

        let cancel = CancellationToken::new();
        let duration = self.debounce_duration;
        let task_uri = uri.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;

            log::debug!(
                target: LOG_TARGET,
                "Debounce timer expired for {}, validating",
                task_uri
            );

            let result =
                tokio::task::spawn_blocking(move || reader.flush_cancellable(&task_cancel)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    log::debug!(target: LOG_TARGET, "Validation of {} ended: {}", task_uri, err);
                }
                Err(err) => {
                    log::error!(target: LOG_TARGET, "Validation of {} panicked: {}", task_uri, err);
                }
            }
        });

        self.active_timers.insert(
            uri.clone(),
            PendingValidation {
                timer: task.abort_handle(),
                cancel,
            },
        );
        true
    }

    /// Cancel the pending validation of `uri`, if any.
    pub fn cancel_validation(&self, uri: &Url) {
        if let Some((_, pending)) = self.active_timers.remove(uri) {
            pending.abort();
            log::trace!(
                target: LOG_TARGET,
                "Cancelled pending validation for {}",
                uri
            );
        }
    }

    /// Number of validations not yet finished.
    pub fn pending_validations(&self) -> usize {
        self.active_timers
            .iter()
            .filter(|entry| !entry.value().timer.is_finished())
            .count()
    }
}
