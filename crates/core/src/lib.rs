#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod quiz;
pub mod sync;
pub mod time;
pub mod timer;

pub use error::Error;
pub use quiz::{QuizMode, QuizState};
pub use sync::{FailureClass, RetryDecision, RetryPolicy, SyncEvent, SyncPhase};
pub use time::Clock;
pub use timer::{Tick, TimerMode, TimerState};
