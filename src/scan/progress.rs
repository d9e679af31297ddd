//! Percent complete and estimated finish time.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Progress arithmetic for one session.
///
/// The per-step duration is the analyzer sweep time plus the dwell, and is
/// replaced whenever a fresh sweep-time reading arrives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReporter {
    total_steps: usize,
    step_duration: Duration,
}

impl ProgressReporter {
    /// Reporter for `total_steps` steps of `step_duration` each
    pub fn new(total_steps: usize, step_duration: Duration) -> Self {
        Self {
            total_steps,
            step_duration,
        }
    }

    /// Step duration from an analyzer sweep time (ms) and the dwell.
    pub fn step_duration_from(sweep_time_ms: f64, dwell: Duration) -> Duration {
        let sweep = Duration::try_from_secs_f64(sweep_time_ms / 1000.0).unwrap_or_default();
        sweep + dwell
    }

    /// Replace the per-step estimate after a sweep-time refresh.
    pub fn set_step_duration(&mut self, step_duration: Duration) {
        self.step_duration = step_duration;
    }

    /// Current per-step estimate
    pub fn step_duration(&self) -> Duration {
        self.step_duration
    }

    /// Steps in the grid
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// `floor(100 * completed / total)`, capped at 100
    pub fn percent(&self, completed: usize) -> u8 {
        if self.total_steps == 0 {
            return 100;
        }
        let pct = (100 * completed.min(self.total_steps)) / self.total_steps;
        pct as u8
    }

    /// Time left once `completed` steps are done
    pub fn remaining(&self, completed: usize) -> Duration {
        let remaining = self.total_steps.saturating_sub(completed);
        self.step_duration
            .checked_mul(u32::try_from(remaining).unwrap_or(u32::MAX))
            .unwrap_or(Duration::MAX)
    }

    /// Estimated finish time measured from `now`
    pub fn eta_at(&self, completed: usize, now: DateTime<Utc>) -> DateTime<Utc> {
        let micros = i64::try_from(self.remaining(completed).as_micros()).unwrap_or(i64::MAX);
        now.checked_add_signed(chrono::Duration::microseconds(micros))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// [`eta_at`](Self::eta_at) from the wall clock
    pub fn eta(&self, completed: usize) -> DateTime<Utc> {
        self.eta_at(completed, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_floors() {
        let reporter = ProgressReporter::new(3, Duration::ZERO);
        assert_eq!(reporter.percent(0), 0);
        assert_eq!(reporter.percent(1), 33);
        assert_eq!(reporter.percent(2), 66);
        assert_eq!(reporter.percent(3), 100);
        assert_eq!(reporter.percent(7), 100);
    }

    #[test]
    fn eta_counts_remaining_steps() {
        let reporter = ProgressReporter::new(20, Duration::from_millis(300));
        let now = Utc::now();
        let eta = reporter.eta_at(10, now);
        assert_eq!(eta - now, chrono::Duration::milliseconds(3000));
    }

    #[test]
    fn refreshed_step_duration_moves_eta() {
        let mut reporter = ProgressReporter::new(4, Duration::from_millis(100));
        let now = Utc::now();
        reporter.set_step_duration(ProgressReporter::step_duration_from(
            250.0,
            Duration::from_millis(50),
        ));
        assert_eq!(reporter.step_duration(), Duration::from_millis(300));
        assert_eq!(reporter.eta_at(2, now) - now, chrono::Duration::milliseconds(600));
    }

    #[test]
    fn invalid_sweep_time_counts_as_zero() {
        let dwell = Duration::from_millis(10);
        assert_eq!(ProgressReporter::step_duration_from(f64::NAN, dwell), dwell);
        assert_eq!(ProgressReporter::step_duration_from(-5.0, dwell), dwell);
    }
}
