//! Core fixed-window rate limiter.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::tracker::AccessTracker;
use crate::config::RateLimitingConfig;

/// Number of independently locked map shards used by [`RateLimiter::new`].
pub const DEFAULT_SHARDS: usize = 16;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request was admitted and counted.
    Allowed {
        /// Requests still available in the current window.
        remaining: u32,
    },
    /// The client has used its quota for the current window.
    Denied {
        /// Time until the current window closes.
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Per-client fixed-window request counter.
///
/// Each client key owns one [`AccessTracker`] in a sharded [`DashMap`]. The
/// check and the counter update for a key run while holding that key's entry,
/// so concurrent callers with the same key are totally ordered and can never
/// over-admit.
///
/// A burst straddling a window boundary can admit up to `2 * limit` requests
/// in a span shorter than one window. That is inherent to fixed windows.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    trackers: DashMap<String, AccessTracker>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter admitting `limit` requests per `window` per client,
    /// reading time from the system clock.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is zero or `window` is zero.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_clock(limit, window, Arc::new(SystemClock))
    }

    /// Create a limiter that reads time from `clock`.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is zero or `window` is zero.
    pub fn with_clock(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        assert!(limit > 0, "rate limit must be greater than zero");
        assert!(!window.is_zero(), "rate limit window must be non-zero");

        Self {
            limit,
            window,
            trackers: DashMap::with_shard_amount(DEFAULT_SHARDS),
            clock,
        }
    }

    /// Replace the shard count. Must be called before any traffic.
    ///
    /// # Panics
    ///
    /// Panics unless `shards` is a power of two greater than one.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.trackers = DashMap::with_shard_amount(shards);
        self
    }

    /// Build a limiter from validated configuration.
    pub fn from_config(config: &RateLimitingConfig) -> Self {
        Self::new(config.requests_per_window, config.window()).with_shards(config.shards)
    }

    /// Decide whether to admit a request from `key`, counting it if admitted.
    pub fn allow_request(&self, key: &str) -> bool {
        self.check(key).is_allowed()
    }

    /// Same as [`allow_request`](Self::allow_request), reporting the remaining
    /// quota or the time until the client may retry.
    pub fn check(&self, key: &str) -> Decision {
        let mut inserted = false;

        let decision = match self.trackers.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let now = self.clock.now();
                let tracker = occupied.get_mut();

                if !tracker.is_open(now, self.window) {
                    tracker.reset(now);
                    Decision::Allowed {
                        remaining: self.limit - 1,
                    }
                } else if tracker.count() < self.limit {
                    tracker.admit();
                    Decision::Allowed {
                        remaining: self.limit - tracker.count(),
                    }
                } else {
                    Decision::Denied {
                        retry_after: tracker.remaining_window(now, self.window),
                    }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(AccessTracker::new(self.clock.now()));
                inserted = true;
                Decision::Allowed {
                    remaining: self.limit - 1,
                }
            }
        };

        // The entry guard is gone; counting every shard is safe again.
        if inserted {
            crate::metrics::set_tracked_clients(self.tracker_count());
        }

        decision
    }

    /// Drop trackers whose window closed at least `grace` ago.
    ///
    /// Trackers with an open window are never touched, so eviction cannot
    /// hand an active client a fresh quota early. Returns the number removed.
    pub fn evict_expired(&self, grace: Duration) -> usize {
        let before = self.trackers.len();
        let now = self.clock.now();

        self.trackers
            .retain(|_, tracker| match tracker.expired_for(now, self.window) {
                Some(expired) => expired < grace,
                None => true,
            });

        before.saturating_sub(self.trackers.len())
    }

    /// Run [`evict_expired`](Self::evict_expired) every `every` on the tokio
    /// runtime and publish the tracker count.
    ///
    /// # Panics
    ///
    /// Panics if `every` is zero.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration, grace: Duration) -> JoinHandle<()> {
        info!(
            interval_secs = every.as_secs(),
            grace_secs = grace.as_secs(),
            "Rate limit tracker sweeper started"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let removed = self.evict_expired(grace);
                let remaining = self.tracker_count();
                crate::metrics::set_tracked_clients(remaining);

                if removed > 0 {
                    debug!(removed, remaining, "Evicted expired rate limit trackers");
                }
            }
        })
    }

    /// Snapshot of the tracker for `key`, if one exists.
    pub fn tracker(&self, key: &str) -> Option<AccessTracker> {
        self.trackers.get(key).map(|tracker| *tracker)
    }

    /// Number of client keys currently tracked.
    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("trackers", &self.trackers.len())
            .finish()
    }
}
