use std::fmt::Debug;

use chrono::Utc;

/// Source of the current unix time, injected so expiry can be tested
/// without sleeping.
pub trait Clock: Debug + Send + Sync {
    /// Current unix timestamp in seconds.
    fn now(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        now_i64()
    }
}

pub fn now_i64() -> i64 {
    Utc::now().timestamp()
}

/// Seconds left until `expires_at`, never negative.
pub fn seconds_until(expires_at: i64, now: i64) -> i64 {
    (expires_at - now).max(0)
}
