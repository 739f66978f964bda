// src/supervisor/backoff.rs

//! Throttling for "process exited" diagnostics.
//!
//! A child that keeps crashing would otherwise log on every poll tick. The
//! backoff only gates *logging*; restarts are driven solely by new remote
//! commits.

use std::time::{Duration, Instant};

pub const INITIAL_EXIT_BACKOFF: Duration = Duration::from_secs(5);
pub const MAX_EXIT_BACKOFF: Duration = Duration::from_secs(5 * 60);
pub const EXIT_BACKOFF_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitBackoff {
    current: Duration,
    last_log: Option<Instant>,
}

impl ExitBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to the pristine state; called on every successful start.
    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
        self.last_log = None;
    }

    /// Minimum spacing required before the next diagnostic.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn last_log(&self) -> Option<Instant> {
        self.last_log
    }

    /// Record an unexplained exit observed at `now`.
    ///
    /// Returns `true` if a diagnostic should be emitted, in which case the
    /// backoff grows by [`EXIT_BACKOFF_FACTOR`] up to [`MAX_EXIT_BACKOFF`].
    pub fn record_exit(&mut self, now: Instant) -> bool {
        if self.current.is_zero() {
            self.current = INITIAL_EXIT_BACKOFF;
        }

        let due = match self.last_log {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.current,
        };

        if due {
            self.last_log = Some(now);
            self.current = self
                .current
                .mul_f64(EXIT_BACKOFF_FACTOR)
                .min(MAX_EXIT_BACKOFF);
        }

        due
    }
}
