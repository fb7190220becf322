//! Countdown computation for the active question.
//!
//! Nothing here holds state. A reading is derived from the instant the timer
//! was last armed and the baseline it was armed with, so callers can poll at
//! any cadence and a throttled host only ever lags by one recomputation.

use chrono::{DateTime, Utc};

use super::candidate::{Candidate, Status};

/// Snapshot of a question countdown at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerReading {
    /// Remaining time the timer was armed with.
    pub baseline_seconds: u32,
    /// Whole seconds since the timer was armed.
    pub elapsed_seconds: u32,
    /// `max(0, baseline - elapsed)`.
    pub remaining_seconds: u32,
}

impl TimerReading {
    /// A reading of zero is the automatic-submission trigger.
    pub fn expired(&self) -> bool {
        self.remaining_seconds == 0
    }
}

/// Computes `elapsed = floor((now - start) / 1s)` and the remaining time.
///
/// A `now` earlier than `start` (clock adjusted backwards) reads as zero elapsed.
pub fn read_timer(start: DateTime<Utc>, baseline_seconds: u32, now: DateTime<Utc>) -> TimerReading {
    let elapsed_ms = (now - start).num_milliseconds().max(0);
    let elapsed_seconds = u32::try_from(elapsed_ms / 1000).unwrap_or(u32::MAX);
    TimerReading {
        baseline_seconds,
        elapsed_seconds,
        remaining_seconds: baseline_seconds.saturating_sub(elapsed_seconds),
    }
}

impl Candidate {
    /// The remaining time the current question's timer was last armed with:
    /// the full limit on entry, or the paused value after a resume.
    pub fn timer_baseline(&self) -> Option<u32> {
        let question = self.current_question()?;
        Some(
            self.remaining_seconds
                .unwrap_or(question.time_limit_seconds),
        )
    }

    /// Reads the live countdown. `None` unless a question is running.
    pub fn read_timer(&self, now: DateTime<Utc>) -> Option<TimerReading> {
        if self.status != Status::InProgress || self.current_answered() {
            return None;
        }
        let start = self.current_question_start_ts?;
        let baseline = self.timer_baseline()?;
        Some(read_timer(start, baseline, now))
    }
}
