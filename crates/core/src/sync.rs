//! State machine for progress synchronisation.
//!
//! The sync engine in `services` owns the queue and the network calls; this
//! module only decides which phase follows which event and what to do with a
//! failed save.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    /// A save request is on the wire.
    Saving,
    /// A failed save is waiting out its backoff before trying again.
    Retrying,
    /// Nothing in flight, but payloads are waiting for connectivity or a drain.
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// A payload was put on the queue instead of being sent.
    Enqueued,
    SaveStarted,
    /// A failed save will be attempted again after a delay.
    RetryScheduled,
    /// The attempt finished (either way) and no retry is pending.
    Settled { queue_empty: bool },
    /// The queue was handed over for sending or found empty.
    Drained,
}

impl SyncPhase {
    /// Transition table. `None` marks an event that is illegal in this phase.
    #[must_use]
    pub fn next(self, event: SyncEvent) -> Option<SyncPhase> {
        use SyncEvent as E;
        use SyncPhase as P;

        match (self, event) {
            (P::Idle | P::Queued, E::Enqueued) => Some(P::Queued),
            (P::Saving, E::Enqueued) => Some(P::Saving),
            (P::Retrying, E::Enqueued) => Some(P::Retrying),

            (P::Idle | P::Queued | P::Retrying, E::SaveStarted) => Some(P::Saving),

            (P::Saving, E::RetryScheduled) => Some(P::Retrying),

            (P::Saving | P::Retrying, E::Settled { queue_empty: true }) => Some(P::Idle),
            (P::Saving | P::Retrying, E::Settled { queue_empty: false }) => Some(P::Queued),

            (P::Idle | P::Queued, E::Drained) => Some(P::Idle),

            _ => None,
        }
    }

    /// A save is in flight or pending a retry, so new payloads must queue.
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, SyncPhase::Saving | SyncPhase::Retrying)
    }
}

/// How a failed save attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 5xx response.
    Server,
    /// No response at all.
    Network,
    /// Any other rejection (4xx, decode errors).
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try the same payload again after `delay`.
    Retry { retry_count: u32, delay: Duration },
    /// Put the payload back on the queue with a fresh retry budget.
    Requeue,
    /// Report the failure; the payload is not kept.
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Backoff unit; attempt `n` waits `base_delay * n`.
    pub base_delay: Duration,
    /// Pause before sending the next queued payload after any attempt.
    pub drain_delay: Duration,
    /// Upper bound on the drain pause while saves keep getting no response.
    pub max_drain_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            drain_delay: Duration::from_secs(1),
            max_drain_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Drain pause after `network_failures` consecutive saves that got no
    /// response: the flat `drain_delay` at first, then `base_delay * n` up to
    /// `max_drain_backoff`.
    #[must_use]
    pub fn drain_delay_after(&self, network_failures: u32) -> Duration {
        if network_failures == 0 {
            return self.drain_delay;
        }
        self.base_delay
            .saturating_mul(network_failures)
            .max(self.drain_delay)
            .min(self.max_drain_backoff)
    }

    #[must_use]
    pub fn decide(&self, failure: FailureClass, retry_count: u32) -> RetryDecision {
        if retry_count >= self.max_retries {
            return RetryDecision::Requeue;
        }
        match failure {
            FailureClass::Server => {
                let next = retry_count + 1;
                RetryDecision::Retry {
                    retry_count: next,
                    delay: self.base_delay * next,
                }
            }
            FailureClass::Network => RetryDecision::Requeue,
            FailureClass::Rejected => RetryDecision::GiveUp,
        }
    }
}
