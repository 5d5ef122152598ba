//! Progress synchronisation: change detection, offline queue, retry.
//!
//! Phases and retry decisions come from `quiz_core::sync`; this module owns
//! the queue, the timers, and the calls into a [`ProgressSink`].

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep};

use quiz_core::{Clock, FailureClass, RetryDecision, RetryPolicy, SyncEvent, SyncPhase};

use crate::error::ApiError;

mod backup;
mod sink;

pub use backup::LocalBackup;
pub use sink::{CategoryProgressSink, ProgressSink};

pub const MAX_ERROR_LOG: usize = 50;
pub const DEFAULT_AUTO_SAVE_INTERVAL: Duration = Duration::from_secs(30);

/// What `save_progress` did with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Identical to the last persisted payload; nothing was sent.
    Unchanged,
    /// Offline or busy; the payload waits in the queue.
    Queued,
    /// The save hit a server error and will be tried again.
    RetryScheduled,
    /// The save failed for good this round and went back on the queue.
    Requeued,
}

impl SaveOutcome {
    /// Whether the server already holds this payload.
    #[must_use]
    pub fn is_persisted(self) -> bool {
        matches!(self, SaveOutcome::Saved | SaveOutcome::Unchanged)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSave {
    pub payload: Value,
    pub retry_count: u32,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncErrorRecord {
    pub error: ApiError,
    pub at: DateTime<Utc>,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub is_saving: bool,
    pub last_save_at: Option<DateTime<Utc>>,
    pub queued_items: usize,
    pub errors: usize,
    pub is_online: bool,
}

impl SyncStatus {
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.queued_items > 0
    }
}

struct SyncState {
    phase: SyncPhase,
    online: bool,
    last_saved: Option<String>,
    last_save_at: Option<DateTime<Utc>>,
    queue: VecDeque<QueuedSave>,
    errors: VecDeque<SyncErrorRecord>,
    /// Consecutive saves that got no response; slows the drain.
    network_failures: u32,
}

impl SyncState {
    fn apply(&mut self, event: SyncEvent) {
        match self.phase.next(event) {
            Some(next) => self.phase = next,
            None => tracing::warn!(phase = ?self.phase, ?event, "ignoring sync event"),
        }
    }

    fn enqueue(&mut self, entry: QueuedSave) {
        self.queue.push_back(entry);
        self.apply(SyncEvent::Enqueued);
    }

    fn record_error(&mut self, record: SyncErrorRecord) {
        self.errors.push_back(record);
        while self.errors.len() > MAX_ERROR_LOG {
            self.errors.pop_front();
        }
    }

    fn is_last_saved(&self, serialized: &str) -> bool {
        self.last_saved.as_deref() == Some(serialized)
    }
}

struct Shared {
    sink: Arc<dyn ProgressSink>,
    policy: RetryPolicy,
    clock: Clock,
    state: Mutex<SyncState>,
}

/// Sync engine for one progress target. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ProgressSync {
    shared: Arc<Shared>,
}

impl ProgressSync {
    #[must_use]
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self::with_options(sink, RetryPolicy::default(), Clock::default())
    }

    #[must_use]
    pub fn with_options(sink: Arc<dyn ProgressSink>, policy: RetryPolicy, clock: Clock) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink,
                policy,
                clock,
                state: Mutex::new(SyncState {
                    phase: SyncPhase::Idle,
                    online: true,
                    last_saved: None,
                    last_save_at: None,
                    queue: VecDeque::new(),
                    errors: VecDeque::new(),
                    network_failures: 0,
                }),
            }),
        }
    }

    // ─── Inspection ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        let state = self.lock();
        SyncStatus {
            phase: state.phase,
            is_saving: state.phase == SyncPhase::Saving,
            last_save_at: state.last_save_at,
            queued_items: state.queue.len(),
            errors: state.errors.len(),
            is_online: state.online,
        }
    }

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.lock().phase
    }

    #[must_use]
    pub fn queued(&self) -> Vec<QueuedSave> {
        self.lock().queue.iter().cloned().collect()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<SyncErrorRecord> {
        self.lock().errors.iter().cloned().collect()
    }

    pub fn clear_errors(&self) {
        self.lock().errors.clear();
    }

    // ─── Saving ─────────────────────────────────────────────────────────────

    /// Persist a progress payload, or queue it when that is not possible now.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Decode` if the payload cannot be serialised and the
    /// sink's error for failures that are neither retried nor requeued.
    pub async fn save_progress<T: Serialize + ?Sized>(
        &self,
        payload: &T,
    ) -> Result<SaveOutcome, ApiError> {
        let payload = serde_json::to_value(payload)?;
        self.submit(payload, 0).await
    }

    async fn submit(&self, payload: Value, retry_count: u32) -> Result<SaveOutcome, ApiError> {
        let serialized = payload.to_string();
        {
            let mut state = self.lock();
            if state.is_last_saved(&serialized) {
                tracing::debug!("progress unchanged, skipping save");
                return Ok(SaveOutcome::Unchanged);
            }
            if !state.online || state.phase.is_busy() {
                tracing::debug!(online = state.online, phase = ?state.phase, "queueing progress");
                state.enqueue(QueuedSave {
                    payload,
                    retry_count,
                    queued_at: self.shared.clock.now(),
                });
                return Ok(SaveOutcome::Queued);
            }
            state.apply(SyncEvent::SaveStarted);
        }
        self.attempt(payload, serialized, retry_count).await
    }

    /// Send one payload. The phase must already be `Saving`.
    async fn attempt(
        &self,
        payload: Value,
        serialized: String,
        retry_count: u32,
    ) -> Result<SaveOutcome, ApiError> {
        let result = self.shared.sink.save(&payload).await;
        let now = self.shared.clock.now();

        let mut state = self.lock();
        let outcome = match result {
            Ok(()) => {
                tracing::debug!(retry_count, "progress saved");
                state.last_saved = Some(serialized);
                state.last_save_at = Some(now);
                state.errors.clear();
                state.network_failures = 0;
                Ok(SaveOutcome::Saved)
            }
            Err(err) => {
                tracing::warn!(error = %err, retry_count, "progress save failed");
                state.record_error(SyncErrorRecord {
                    error: err.clone(),
                    at: now,
                    payload: payload.clone(),
                });
                let class = err.failure_class();
                state.network_failures = match class {
                    FailureClass::Network => state.network_failures.saturating_add(1),
                    FailureClass::Server | FailureClass::Rejected => 0,
                };
                match self.shared.policy.decide(class, retry_count) {
                    RetryDecision::Retry { retry_count, delay } => {
                        state.apply(SyncEvent::RetryScheduled);
                        self.schedule_retry(payload, retry_count, delay);
                        return Ok(SaveOutcome::RetryScheduled);
                    }
                    RetryDecision::Requeue => {
                        state.queue.push_back(QueuedSave {
                            payload,
                            retry_count: 0,
                            queued_at: now,
                        });
                        Ok(SaveOutcome::Requeued)
                    }
                    RetryDecision::GiveUp => Err(err),
                }
            }
        };

        let queue_empty = state.queue.is_empty();
        state.apply(SyncEvent::Settled { queue_empty });
        if !queue_empty {
            let delay = self.shared.policy.drain_delay_after(state.network_failures);
            self.schedule_drain(delay);
        }
        outcome
    }

    fn schedule_retry(&self, payload: Value, retry_count: u32, delay: Duration) {
        tracing::info!(retry_count, ?delay, "retrying progress save");
        let this = self.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            this.resume_retry(payload, retry_count).await;
        });
    }

    async fn resume_retry(&self, payload: Value, retry_count: u32) {
        let serialized = payload.to_string();
        {
            let mut state = self.lock();
            if !state.online {
                tracing::debug!("offline during retry backoff, queueing progress");
                state.queue.push_front(QueuedSave {
                    payload,
                    retry_count,
                    queued_at: self.shared.clock.now(),
                });
                state.apply(SyncEvent::Settled { queue_empty: false });
                return;
            }
            state.apply(SyncEvent::SaveStarted);
        }
        if let Err(err) = self.attempt(payload, serialized, retry_count).await {
            tracing::debug!(error = %err, "retried progress save rejected");
        }
    }

    fn schedule_drain(&self, delay: Duration) {
        tracing::debug!(?delay, "draining queued progress");
        let this = self.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            this.drain_next().await;
        });
    }

    /// Send the oldest queued payload, skipping ones already persisted.
    async fn drain_next(&self) {
        let (entry, serialized) = loop {
            let mut state = self.lock();
            if !state.online || state.phase.is_busy() {
                return;
            }
            let Some(entry) = state.queue.pop_front() else {
                state.apply(SyncEvent::Drained);
                return;
            };
            let serialized = entry.payload.to_string();
            if state.is_last_saved(&serialized) {
                tracing::debug!("queued progress already saved, skipping");
                continue;
            }
            state.apply(SyncEvent::SaveStarted);
            break (entry, serialized);
        };
        if let Err(err) = self
            .attempt(entry.payload, serialized, entry.retry_count)
            .await
        {
            tracing::debug!(error = %err, "queued progress save rejected");
        }
    }

    // ─── Connectivity ───────────────────────────────────────────────────────

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    /// Record a connectivity change. Coming back online drains the queue and
    /// returns how many payloads were sent.
    pub async fn set_online(&self, online: bool) -> usize {
        let was_online = {
            let mut state = self.lock();
            if online {
                state.network_failures = 0;
            }
            mem::replace(&mut state.online, online)
        };
        match (was_online, online) {
            (false, true) => {
                tracing::info!("back online, syncing queued progress");
                self.sync_queued().await
            }
            (true, false) => {
                tracing::info!("gone offline, progress will be queued");
                0
            }
            _ => 0,
        }
    }

    /// Send every queued payload, oldest first, one at a time. Returns how
    /// many were taken off the queue.
    pub async fn sync_queued(&self) -> usize {
        let items = {
            let mut state = self.lock();
            if !state.online || state.queue.is_empty() || state.phase.is_busy() {
                return 0;
            }
            state.apply(SyncEvent::Drained);
            mem::take(&mut state.queue)
        };

        let count = items.len();
        tracing::info!(count, "syncing queued progress");
        for item in items {
            if let Err(err) = self.submit(item.payload, item.retry_count).await {
                tracing::debug!(error = %err, "queued progress save rejected");
            }
        }
        count
    }

    /// Flush the queue now instead of waiting for the drain timer.
    pub async fn force_sync(&self) -> usize {
        if self.lock().queue.is_empty() {
            return 0;
        }
        tracing::info!("force syncing queued progress");
        self.sync_queued().await
    }

    // ─── Auto-save ──────────────────────────────────────────────────────────

    /// Save whatever `getter` returns every `interval`, skipping ticks while
    /// a save is in flight. Stops when the handle is dropped.
    pub fn start_auto_save<T, F>(&self, interval: Duration, getter: F) -> AutoSaveHandle
    where
        T: Serialize + Send + Sync + 'static,
        F: Fn() -> Option<T> + Send + 'static,
    {
        let this = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                if this.phase().is_busy() {
                    continue;
                }
                let Some(payload) = getter() else {
                    continue;
                };
                if let Err(err) = this.save_progress(&payload).await {
                    tracing::warn!(error = %err, "auto-save failed");
                }
            }
        });
        AutoSaveHandle { task }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Running auto-save loop; aborted on drop.
pub struct AutoSaveHandle {
    task: JoinHandle<()>,
}

impl AutoSaveHandle {
    pub fn stop(self) {
        drop(self);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for AutoSaveHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
