use serde::{Deserialize, Serialize};

/// Seconds left at which an exam is "running out".
pub const RUNNING_OUT_SECS: u64 = 300;
/// Seconds left at which an exam is "critical".
pub const CRITICAL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    /// Counts up from zero without bound.
    Practice,
    /// Counts down from the configured duration, stopping at zero.
    Exam,
}

/// Effect of a single one-second tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No tick source is active or no mode was chosen.
    Idle,
    /// Tick arrived while paused and was ignored.
    Paused,
    Advanced,
    /// The exam countdown reached zero; the tick source must stop.
    Expired,
}

/// Timer bookkeeping without any clock attached. A driver calls `tick` once per second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerState {
    mode: Option<TimerMode>,
    duration_minutes: u64,
    time_elapsed: u64,
    time_remaining: u64,
    is_paused: bool,
    is_ticking: bool,
}

impl TimerState {
    #[must_use]
    pub fn new(duration_minutes: u64) -> Self {
        Self {
            mode: None,
            duration_minutes,
            time_elapsed: 0,
            time_remaining: 0,
            is_paused: false,
            is_ticking: false,
        }
    }

    fn duration_secs(&self) -> u64 {
        self.duration_minutes.saturating_mul(60)
    }

    /// Selects the mode and loads its starting value.
    pub fn initialize(&mut self, mode: TimerMode) {
        self.mode = Some(mode);
        match mode {
            TimerMode::Practice => self.time_elapsed = 0,
            TimerMode::Exam => self.time_remaining = self.duration_secs(),
        }
        self.is_paused = false;
    }

    /// Marks the tick source active. Restarting an active timer is harmless.
    pub fn start(&mut self) {
        self.is_ticking = true;
    }

    pub fn stop(&mut self) {
        self.is_ticking = false;
    }

    pub fn pause(&mut self) {
        self.is_paused = true;
    }

    pub fn resume(&mut self) {
        self.is_paused = false;
    }

    /// Stops ticking and restores the starting values for the configured duration.
    pub fn reset(&mut self) {
        self.stop();
        self.time_elapsed = 0;
        self.time_remaining = self.duration_secs();
        self.is_paused = false;
    }

    pub fn tick(&mut self) -> Tick {
        if !self.is_ticking {
            return Tick::Idle;
        }
        if self.is_paused {
            return Tick::Paused;
        }
        match self.mode {
            None => Tick::Idle,
            Some(TimerMode::Practice) => {
                self.time_elapsed = self.time_elapsed.saturating_add(1);
                Tick::Advanced
            }
            Some(TimerMode::Exam) => {
                self.time_remaining = self.time_remaining.saturating_sub(1);
                if self.time_remaining == 0 {
                    self.stop();
                    Tick::Expired
                } else {
                    Tick::Advanced
                }
            }
        }
    }

    #[must_use]
    pub fn mode(&self) -> Option<TimerMode> {
        self.mode
    }

    #[must_use]
    pub fn duration_minutes(&self) -> u64 {
        self.duration_minutes
    }

    #[must_use]
    pub fn time_elapsed(&self) -> u64 {
        self.time_elapsed
    }

    #[must_use]
    pub fn time_remaining(&self) -> u64 {
        self.time_remaining
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.is_ticking
    }

    /// Seconds spent in the session, whichever way the timer counts.
    #[must_use]
    pub fn total_time_spent(&self) -> u64 {
        match self.mode {
            Some(TimerMode::Practice) => self.time_elapsed,
            Some(TimerMode::Exam) => self.duration_secs().saturating_sub(self.time_remaining),
            None => 0,
        }
    }

    #[must_use]
    pub fn is_running_out(&self) -> bool {
        self.mode == Some(TimerMode::Exam) && self.time_remaining <= RUNNING_OUT_SECS
    }

    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.mode == Some(TimerMode::Exam) && self.time_remaining <= CRITICAL_SECS
    }

    /// Display string for the value relevant to the current mode.
    #[must_use]
    pub fn formatted_time(&self) -> String {
        let seconds = match self.mode {
            Some(TimerMode::Practice) => self.time_elapsed,
            _ => self.time_remaining,
        };
        format_time(seconds)
    }
}

/// Formats seconds as `1h 2m 3s`, omitting leading zero units.
#[must_use]
pub fn format_time(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
