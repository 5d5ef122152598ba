use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use quiz_core::{Tick, TimerMode, TimerState};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Point-in-time view of the timer, published after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub mode: Option<TimerMode>,
    pub time_elapsed: u64,
    pub time_remaining: u64,
    pub is_paused: bool,
    pub is_ticking: bool,
    pub is_running_out: bool,
    pub is_critical: bool,
    pub formatted: String,
}

impl From<&TimerState> for TimerSnapshot {
    fn from(state: &TimerState) -> Self {
        Self {
            mode: state.mode(),
            time_elapsed: state.time_elapsed(),
            time_remaining: state.time_remaining(),
            is_paused: state.is_paused(),
            is_ticking: state.is_ticking(),
            is_running_out: state.is_running_out(),
            is_critical: state.is_critical(),
            formatted: state.formatted_time(),
        }
    }
}

/// Drives a [`TimerState`] from a tokio interval.
///
/// At most one tick task exists; starting again replaces it. Dropping the
/// timer stops the task.
pub struct QuizTimer {
    state: Arc<Mutex<TimerState>>,
    snapshots: Arc<watch::Sender<TimerSnapshot>>,
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl QuizTimer {
    #[must_use]
    pub fn new(duration_minutes: u64) -> Self {
        Self::with_period(duration_minutes, TICK_PERIOD)
    }

    #[must_use]
    pub fn with_period(duration_minutes: u64, period: Duration) -> Self {
        let state = TimerState::new(duration_minutes);
        let (tx, _rx) = watch::channel(TimerSnapshot::from(&state));
        Self {
            state: Arc::new(Mutex::new(state)),
            snapshots: Arc::new(tx),
            period,
            task: None,
        }
    }

    pub fn initialize(&mut self, mode: TimerMode) {
        self.update(|state| state.initialize(mode));
    }

    /// Start ticking, replacing any running tick task.
    pub fn start(&mut self) {
        self.abort_task();
        self.update(TimerState::start);

        let state = Arc::clone(&self.state);
        let snapshots = Arc::clone(&self.snapshots);
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let (tick, snapshot) = {
                    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    let tick = state.tick();
                    (tick, TimerSnapshot::from(&*state))
                };
                snapshots.send_replace(snapshot);
                match tick {
                    Tick::Expired => {
                        tracing::info!("exam time expired");
                        break;
                    }
                    Tick::Idle => break,
                    Tick::Paused | Tick::Advanced => {}
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        self.abort_task();
        self.update(TimerState::stop);
    }

    pub fn pause(&self) {
        self.update(TimerState::pause);
    }

    pub fn resume(&self) {
        self.update(TimerState::resume);
    }

    pub fn reset(&mut self) {
        self.abort_task();
        self.update(TimerState::reset);
    }

    #[must_use]
    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::from(&*self.lock())
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.subscribe()
    }

    #[must_use]
    pub fn total_time_spent(&self) -> u64 {
        self.lock().total_time_spent()
    }

    /// Whether a tick task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn update(&self, f: impl FnOnce(&mut TimerState)) {
        let snapshot = {
            let mut state = self.lock();
            f(&mut state);
            TimerSnapshot::from(&*state)
        };
        self.snapshots.send_replace(snapshot);
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for QuizTimer {
    fn drop(&mut self) {
        self.abort_task();
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::sleep;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn exam_countdown_expires_and_stops_task() {
        let mut timer = QuizTimer::new(1);
        timer.initialize(TimerMode::Exam);
        let mut updates = timer.subscribe();
        timer.start();

        sleep(Duration::from_millis(61_500)).await;

        let snapshot = timer.snapshot();
        assert_eq!(snapshot.time_remaining, 0);
        assert!(!snapshot.is_ticking);
        assert!(snapshot.is_critical);
        assert!(!timer.is_running());
        assert_eq!(updates.borrow_and_update().time_remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_does_not_double_tick() {
        let mut timer = QuizTimer::new(0);
        timer.initialize(TimerMode::Practice);
        timer.start();
        timer.start();

        sleep(Duration::from_millis(5_500)).await;
        assert_eq!(timer.total_time_spent(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_ticks_are_ignored() {
        let mut timer = QuizTimer::new(0);
        timer.initialize(TimerMode::Practice);
        timer.start();

        sleep(Duration::from_millis(2_500)).await;
        timer.pause();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(timer.snapshot().time_elapsed, 2);
        assert!(timer.is_running());

        timer.resume();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(timer.snapshot().time_elapsed, 3);
        assert_eq!(timer.snapshot().formatted, "3s");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_reset_end_the_task() {
        let mut timer = QuizTimer::new(10);
        timer.initialize(TimerMode::Exam);
        timer.start();
        sleep(Duration::from_millis(3_500)).await;
        assert_eq!(timer.snapshot().time_remaining, 597);

        timer.stop();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(timer.snapshot().time_remaining, 597);
        assert!(!timer.is_running());

        timer.reset();
        let snapshot = timer.snapshot();
        assert_eq!(snapshot.time_remaining, 600);
        assert!(!snapshot.is_ticking);
        assert_eq!(timer.total_time_spent(), 0);
    }
}
