use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::SyncPhase;
use quiz_core::time::fixed_clock;
use serde_json::{Value, json};
use services::sync::{MAX_ERROR_LOG, ProgressSink, ProgressSync, SaveOutcome};
use services::{ApiError, TransportError};
use tokio::time::sleep;

/// Sink that records payloads and answers from a script, `Ok` once exhausted.
#[derive(Default)]
struct ScriptedSink {
    calls: Mutex<Vec<Value>>,
    script: Mutex<VecDeque<Result<(), ApiError>>>,
    latency: Option<Duration>,
}

impl ScriptedSink {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn scripted(results: impl IntoIterator<Item = Result<(), ApiError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        })
    }

    fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency: Some(latency),
            ..Self::default()
        })
    }

    fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for ScriptedSink {
    async fn save(&self, payload: &Value) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(payload.clone());
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

fn engine(sink: &Arc<ScriptedSink>) -> ProgressSync {
    ProgressSync::with_options(sink.clone(), Default::default(), fixed_clock())
}

fn server_error() -> Result<(), ApiError> {
    Err(ApiError::Server {
        status: 503,
        message: "unavailable".into(),
    })
}

fn progress(answered: u32) -> Value {
    json!({
        "current_question_index": answered,
        "correct_count": answered,
        "answered_count": answered,
        "time_spent_seconds": 10 * answered,
        "completed": false
    })
}

#[tokio::test(start_paused = true)]
async fn identical_payload_is_sent_once() {
    let sink = ScriptedSink::new();
    let sync = engine(&sink);

    assert_eq!(sync.save_progress(&progress(1)).await.unwrap(), SaveOutcome::Saved);
    assert_eq!(
        sync.save_progress(&progress(1)).await.unwrap(),
        SaveOutcome::Unchanged
    );
    assert!(SaveOutcome::Unchanged.is_persisted());
    assert_eq!(sink.calls().len(), 1);
    assert!(sync.status().last_save_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn offline_saves_wait_for_reconnection() {
    let sink = ScriptedSink::new();
    let sync = engine(&sink);

    sync.set_online(false).await;
    assert_eq!(sync.save_progress(&progress(1)).await.unwrap(), SaveOutcome::Queued);
    assert!(sink.calls().is_empty());
    let status = sync.status();
    assert_eq!(status.phase, SyncPhase::Queued);
    assert!(status.has_unsaved_changes());
    assert!(!status.is_online);

    assert_eq!(sync.set_online(true).await, 1);
    assert_eq!(sink.calls(), vec![progress(1)]);
    assert_eq!(sync.phase(), SyncPhase::Idle);
    assert!(sync.queued().is_empty());
}

#[tokio::test(start_paused = true)]
async fn saves_during_a_save_are_queued_then_drained() {
    let sink = ScriptedSink::slow(Duration::from_millis(100));
    let sync = engine(&sink);

    let first = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.save_progress(&progress(1)).await })
    };
    sleep(Duration::from_millis(10)).await;
    assert!(sync.status().is_saving);

    assert_eq!(sync.save_progress(&progress(2)).await.unwrap(), SaveOutcome::Queued);
    assert_eq!(sync.phase(), SyncPhase::Saving);

    assert_eq!(first.await.unwrap().unwrap(), SaveOutcome::Saved);
    assert_eq!(sync.phase(), SyncPhase::Queued);

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(sink.calls(), vec![progress(1), progress(2)]);
    assert_eq!(sync.phase(), SyncPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn server_errors_retry_with_backoff() {
    let sink = ScriptedSink::scripted([server_error()]);
    let sync = engine(&sink);

    assert_eq!(
        sync.save_progress(&progress(3)).await.unwrap(),
        SaveOutcome::RetryScheduled
    );
    assert_eq!(sync.phase(), SyncPhase::Retrying);
    assert_eq!(sync.status().errors, 1);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(sink.calls().len(), 1);

    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(sink.calls().len(), 2);
    assert_eq!(sync.phase(), SyncPhase::Idle);
    assert_eq!(sync.status().errors, 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_requeue_with_a_fresh_budget() {
    let sink = ScriptedSink::scripted([
        server_error(),
        server_error(),
        server_error(),
        server_error(),
    ]);
    let sync = engine(&sink);

    sync.save_progress(&progress(4)).await.unwrap();
    // Retries after 1 s, 2 s, 3 s; the fourth failure requeues and the drain
    // sends it again 1 s later.
    sleep(Duration::from_millis(6_500)).await;
    assert_eq!(sink.calls().len(), 4);
    assert_eq!(sync.phase(), SyncPhase::Queued);
    assert_eq!(sync.queued()[0].retry_count, 0);

    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(sink.calls().len(), 5);
    assert_eq!(sync.phase(), SyncPhase::Idle);
    assert!(sync.queued().is_empty());
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_reported_not_retried() {
    let sink = ScriptedSink::scripted([Err(ApiError::NotFound {
        message: "no such category".into(),
    })]);
    let sync = engine(&sink);

    let err = sync.save_progress(&progress(1)).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound { .. }));
    assert_eq!(sync.phase(), SyncPhase::Idle);
    assert_eq!(sync.errors()[0].payload, progress(1));

    sleep(Duration::from_secs(10)).await;
    assert_eq!(sink.calls().len(), 1);

    sync.clear_errors();
    assert_eq!(sync.status().errors, 0);
}

fn unreachable() -> Result<(), ApiError> {
    Err(ApiError::Network(TransportError::Unreachable(
        "connection refused".into(),
    )))
}

#[tokio::test(start_paused = true)]
async fn network_failures_are_requeued_and_drained() {
    let sink = ScriptedSink::scripted([unreachable(), unreachable()]);
    let sync = engine(&sink);

    assert_eq!(
        sync.save_progress(&progress(2)).await.unwrap(),
        SaveOutcome::Requeued
    );
    assert_eq!(sync.phase(), SyncPhase::Queued);
    assert_eq!(sync.queued()[0].payload, progress(2));

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(sink.calls().len(), 2);
    assert_eq!(sync.phase(), SyncPhase::Queued);

    // Second unanswered save doubles the pause before the next drain.
    sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.calls().len(), 2);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.calls().len(), 3);
    assert_eq!(sync.phase(), SyncPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn drain_backs_off_until_the_server_answers() {
    let sink = ScriptedSink::scripted((0..4).map(|_| unreachable()));
    let sync = engine(&sink);

    sync.save_progress(&progress(5)).await.unwrap();
    // Drains follow after 1 s, 2 s, 3 s and 4 s.
    sleep(Duration::from_millis(5_500)).await;
    assert_eq!(sink.calls().len(), 3);
    assert_eq!(sync.phase(), SyncPhase::Queued);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.calls().len(), 4);

    sleep(Duration::from_secs(4)).await;
    assert_eq!(sink.calls().len(), 5);
    assert_eq!(sync.phase(), SyncPhase::Idle);
    assert!(sync.queued().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reconnecting_resets_the_drain_backoff() {
    let sink = ScriptedSink::scripted((0..4).map(|_| unreachable()));
    let sync = engine(&sink);

    sync.save_progress(&progress(6)).await.unwrap();
    sleep(Duration::from_millis(3_500)).await;
    assert_eq!(sink.calls().len(), 3);

    sync.set_online(false).await;
    assert_eq!(sync.set_online(true).await, 1);
    assert_eq!(sink.calls().len(), 4);
    assert_eq!(sync.phase(), SyncPhase::Queued);

    // Back to the flat pause instead of the 4 s the earlier failures earned.
    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(sink.calls().len(), 5);
    assert_eq!(sync.phase(), SyncPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn force_sync_flushes_without_waiting_for_the_drain() {
    let sink = ScriptedSink::scripted([unreachable()]);
    let sync = engine(&sink);

    sync.save_progress(&progress(2)).await.unwrap();
    assert_eq!(sync.force_sync().await, 1);
    assert_eq!(sink.calls().len(), 2);
    assert_eq!(sync.phase(), SyncPhase::Idle);
    assert_eq!(sync.force_sync().await, 0);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(sink.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn error_log_keeps_only_recent_entries() {
    let failures = (0..MAX_ERROR_LOG + 10).map(|_| {
        Err(ApiError::Http {
            status: 409,
            message: "conflict".into(),
        })
    });
    let sink = ScriptedSink::scripted(failures);
    let sync = engine(&sink);

    for n in 0..(MAX_ERROR_LOG + 10) {
        let answered = u32::try_from(n).unwrap();
        let _ = sync.save_progress(&progress(answered)).await;
    }
    let errors = sync.errors();
    assert_eq!(errors.len(), MAX_ERROR_LOG);
    assert_eq!(errors[0].payload, progress(10));
}

#[tokio::test(start_paused = true)]
async fn auto_save_polls_until_handle_dropped() {
    let sink = ScriptedSink::new();
    let sync = engine(&sink);
    let counter = Arc::new(AtomicU32::new(0));

    let source = counter.clone();
    let handle = sync.start_auto_save(Duration::from_secs(30), move || {
        Some(progress(source.fetch_add(1, Ordering::SeqCst) + 1))
    });

    sleep(Duration::from_secs(95)).await;
    assert_eq!(sink.calls().len(), 3);
    assert!(!handle.is_finished());

    drop(handle);
    sleep(Duration::from_secs(60)).await;
    assert_eq!(sink.calls().len(), 3);
}
