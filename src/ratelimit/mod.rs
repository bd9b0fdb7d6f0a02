//! Per-client fixed-window rate limiting.

mod clock;
mod key;
mod limiter;
mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{parse_remote_addr, ClientKeyExtractor, ForwardedFor, PeerAddr};
pub use limiter::{Decision, RateLimiter, DEFAULT_SHARDS};
pub use tracker::AccessTracker;
