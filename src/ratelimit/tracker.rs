//! Per-client window state.

use std::time::{Duration, Instant};

/// Window start and admitted-request count for one client key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessTracker {
    window_start: Instant,
    count: u32,
}

impl AccessTracker {
    /// Start tracking a client whose first request was admitted at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 1,
        }
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Requests admitted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Whether the window that began at `window_start` is still open at `now`.
    pub fn is_open(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) < window
    }

    /// Time left before the current window closes. Zero once it has closed.
    pub fn remaining_window(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.window_start))
    }

    /// How long ago the window closed, or `None` while it is still open.
    pub fn expired_for(&self, now: Instant, window: Duration) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.window_start);
        elapsed.checked_sub(window)
    }

    pub(crate) fn admit(&mut self) {
        self.count += 1;
    }

    /// Begin a fresh window at `now` with this request as its first.
    pub(crate) fn reset(&mut self, now: Instant) {
        self.window_start = now;
        self.count = 1;
    }
}
